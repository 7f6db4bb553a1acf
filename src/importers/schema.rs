//! Declarative logical schemas
//!
//! Export headers drift across terminal versions, so each canonical
//! column declares an ordered list of accepted header variants. A variant
//! is either an exact match or a substring match; exact is used where a
//! longer sibling header would otherwise collide (总资产 must never bind
//! to 昨日总资产, A股资产 must never bind to the 占比 column).
//!
//! Matching is first-match-wins in declared order and a physical column
//! is consumed at most once.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{FundError, Result};
use crate::importers::sheet::{CellValue, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Exact,
    Substring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Amount,
}

pub struct ColumnSpec {
    pub canonical: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    /// Ordered variants; tried in declaration order
    pub variants: &'static [(MatchRule, &'static str)],
}

pub struct LogicalSchema {
    pub name: &'static str,
    /// Text column whose empty value drops the row
    pub key_column: Option<&'static str>,
    /// Amount column whose non-positive value drops the row
    pub positive_column: Option<&'static str>,
    pub columns: &'static [ColumnSpec],
}

/// 单元资产账户资产导出 - per-unit equity assets
pub static UNIT_ASSET: LogicalSchema = LogicalSchema {
    name: "unit_asset",
    key_column: Some("unit_name"),
    positive_column: Some("total_asset"),
    columns: &[
        ColumnSpec {
            canonical: "unit_name",
            kind: ColumnKind::Text,
            required: true,
            variants: &[
                (MatchRule::Substring, "单元名称"),
                (MatchRule::Substring, "产品名称"),
            ],
        },
        ColumnSpec {
            canonical: "total_asset",
            kind: ColumnKind::Amount,
            required: true,
            variants: &[(MatchRule::Exact, "总资产")],
        },
        ColumnSpec {
            canonical: "stock_asset",
            kind: ColumnKind::Amount,
            required: false,
            variants: &[(MatchRule::Exact, "A股资产")],
        },
        ColumnSpec {
            canonical: "bond_asset",
            kind: ColumnKind::Amount,
            required: false,
            variants: &[(MatchRule::Exact, "债券资产")],
        },
    ],
};

/// 期货资产导出 - futures account assets
pub static FUTURES_ASSET: LogicalSchema = LogicalSchema {
    name: "futures_asset",
    key_column: Some("unit_name"),
    positive_column: None,
    columns: &[
        ColumnSpec {
            canonical: "unit_name",
            kind: ColumnKind::Text,
            required: true,
            variants: &[
                (MatchRule::Substring, "产品名称"),
                (MatchRule::Substring, "单元名称"),
            ],
        },
        ColumnSpec {
            canonical: "futures_equity",
            kind: ColumnKind::Amount,
            required: true,
            variants: &[
                (MatchRule::Exact, "客户权益"),
                (MatchRule::Exact, "市值权益"),
            ],
        },
        ColumnSpec {
            canonical: "futures_market_value",
            kind: ColumnKind::Amount,
            required: false,
            variants: &[(MatchRule::Exact, "期货市值")],
        },
    ],
};

/// 单元资产账户持仓导出 - per-product position rows
pub static UNIT_POSITIONS: LogicalSchema = LogicalSchema {
    name: "unit_positions",
    key_column: Some("product_name"),
    positive_column: Some("market_value"),
    columns: &[
        ColumnSpec {
            canonical: "product_name",
            kind: ColumnKind::Text,
            required: true,
            variants: &[(MatchRule::Substring, "产品名称")],
        },
        ColumnSpec {
            canonical: "stock_code",
            kind: ColumnKind::Text,
            required: true,
            variants: &[(MatchRule::Substring, "证券代码")],
        },
        ColumnSpec {
            canonical: "stock_name",
            kind: ColumnKind::Text,
            required: false,
            variants: &[(MatchRule::Substring, "证券名称")],
        },
        ColumnSpec {
            canonical: "market_value",
            kind: ColumnKind::Amount,
            required: true,
            variants: &[(MatchRule::Substring, "持仓市值")],
        },
        ColumnSpec {
            canonical: "change_pct",
            kind: ColumnKind::Amount,
            required: false,
            variants: &[
                (MatchRule::Substring, "当日涨跌幅"),
                (MatchRule::Substring, "涨跌幅"),
            ],
        },
    ],
};

/// Account-*.csv - standalone terminal single-account export
pub static ACCOUNT: LogicalSchema = LogicalSchema {
    name: "account",
    key_column: None,
    positive_column: Some("total_asset"),
    columns: &[ColumnSpec {
        canonical: "total_asset",
        kind: ColumnKind::Amount,
        required: true,
        variants: &[(MatchRule::Substring, "总资产")],
    }],
};

/// canonical column -> physical column index
pub type HeaderMap = HashMap<&'static str, usize>;

/// Map file headers to canonical columns. Fails only when a required
/// column has no matching variant, naming the column and the file.
pub fn map_headers(schema: &LogicalSchema, headers: &[String], file_label: &str) -> Result<HeaderMap> {
    let mut mapping = HeaderMap::new();
    let mut consumed = vec![false; headers.len()];

    for spec in schema.columns {
        'variants: for (rule, variant) in spec.variants {
            for (idx, header) in headers.iter().enumerate() {
                if consumed[idx] {
                    continue;
                }
                let header = header.trim();
                let hit = match rule {
                    MatchRule::Exact => header == *variant,
                    MatchRule::Substring => header.contains(variant),
                };
                if hit {
                    mapping.insert(spec.canonical, idx);
                    consumed[idx] = true;
                    break 'variants;
                }
            }
        }
        if spec.required && !mapping.contains_key(spec.canonical) {
            return Err(FundError::MissingColumn {
                file: file_label.to_string(),
                column: spec.canonical.to_string(),
            }
            .into());
        }
    }

    Ok(mapping)
}

/// One row after mapping and coercion
#[derive(Debug, Clone, Default)]
pub struct NormalizedRow {
    text: HashMap<&'static str, String>,
    amounts: HashMap<&'static str, Decimal>,
}

impl NormalizedRow {
    pub fn text(&self, column: &str) -> Option<&str> {
        self.text.get(column).map(String::as_str)
    }

    pub fn amount(&self, column: &str) -> Option<Decimal> {
        self.amounts.get(column).copied()
    }

    /// Missing side of a feed defaults to zero
    pub fn amount_or_zero(&self, column: &str) -> Decimal {
        self.amount(column).unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug)]
pub struct NormalizedTable {
    pub rows: Vec<NormalizedRow>,
    /// Rows dropped for empty key, unparseable numerics, or failing the
    /// positive-column rule
    pub dropped: usize,
}

/// Parse a cell as a monetary/percentage amount. Empty cells are `None`
/// (callers default them); non-empty garbage is an error so the row can
/// be dropped rather than silently zeroed.
fn parse_amount(cell: &CellValue) -> std::result::Result<Option<Decimal>, ()> {
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::Number(f) => Decimal::try_from(*f).map(Some).map_err(|_| ()),
        CellValue::Text(raw) => {
            let cleaned = raw.trim().trim_end_matches('%').replace(',', "");
            if cleaned.is_empty() {
                return Ok(None);
            }
            Decimal::from_str(&cleaned).map(Some).map_err(|_| ())
        }
    }
}

/// Apply a schema to a raw table: map headers, coerce cells, drop
/// invalid rows.
pub fn normalize(table: &Table, schema: &LogicalSchema, file_label: &str) -> Result<NormalizedTable> {
    let mapping = map_headers(schema, &table.headers, file_label)?;

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    'rows: for raw in &table.rows {
        let mut row = NormalizedRow::default();

        for spec in schema.columns {
            let Some(&idx) = mapping.get(spec.canonical) else {
                continue;
            };
            let cell = raw.get(idx).unwrap_or(&CellValue::Empty);
            match spec.kind {
                ColumnKind::Text => {
                    let value = cell.as_text().trim().to_string();
                    if schema.key_column == Some(spec.canonical) && value.is_empty() {
                        dropped += 1;
                        continue 'rows;
                    }
                    row.text.insert(spec.canonical, value);
                }
                ColumnKind::Amount => match parse_amount(cell) {
                    Ok(Some(value)) => {
                        row.amounts.insert(spec.canonical, value);
                    }
                    Ok(None) => {}
                    Err(()) => {
                        dropped += 1;
                        continue 'rows;
                    }
                },
            }
        }

        if let Some(positive) = schema.positive_column {
            if row.amount_or_zero(positive) <= Decimal::ZERO {
                dropped += 1;
                continue 'rows;
            }
        }

        rows.push(row);
    }

    Ok(NormalizedTable { rows, dropped })
}
