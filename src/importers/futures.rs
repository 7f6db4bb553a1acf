//! Futures asset export reader (期货资产导出)
//!
//! Sheet 1 carries per-product futures equity; sheet 2, when present,
//! carries benchmark return rows keyed by name in the first column.

use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::importers::schema::{self, FUTURES_ASSET};
use crate::importers::sheet::{self, CellValue};

/// Benchmark row looked up on sheet 2 by default
pub const DEFAULT_BENCHMARK: &str = "中证1000当日收益率";

#[derive(Debug, Clone, PartialEq)]
pub struct FuturesAssetRow {
    pub unit: String,
    pub futures_equity: Decimal,
    pub futures_market_value: Decimal,
}

/// Parse the main sheet of a futures export
pub fn read_futures_assets(path: &Path) -> Result<Vec<FuturesAssetRow>> {
    let file_label = path.display().to_string();
    let table = sheet::read_table(path)?;
    let normalized = schema::normalize(&table, &FUTURES_ASSET, &file_label)?;

    if normalized.dropped > 0 {
        warn!("{}: dropped {} invalid rows", file_label, normalized.dropped);
    }

    let rows: Vec<FuturesAssetRow> = normalized
        .rows
        .iter()
        .filter_map(|row| {
            Some(FuturesAssetRow {
                unit: row.text("unit_name")?.to_string(),
                futures_equity: row.amount("futures_equity")?,
                futures_market_value: row.amount_or_zero("futures_market_value"),
            })
        })
        .collect();

    info!("{}: parsed {} futures asset rows", file_label, rows.len());
    Ok(rows)
}

/// Benchmark daily return from sheet 2, as a percentage. Values between
/// -1 and 1 are decimal form and scaled by 100; anything else is already
/// percent. `Ok(None)` when the sheet or the row is absent.
pub fn read_benchmark_return(path: &Path, benchmark: &str) -> Result<Option<Decimal>> {
    let Some(table) = sheet::read_excel_sheet(path, 1)? else {
        debug!("{}: no benchmark sheet", path.display());
        return Ok(None);
    };

    // Header row of the benchmark sheet is itself a name/value pair, so
    // scan headers plus body rows uniformly.
    let header_pair: Vec<CellValue> = table
        .headers
        .iter()
        .map(|h| {
            if h.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(h.clone())
            }
        })
        .collect();

    for row in std::iter::once(&header_pair).chain(table.rows.iter()) {
        let Some(name) = row.first() else {
            continue;
        };
        if !name.as_text().contains(benchmark) {
            continue;
        }
        let Some(value) = row.get(1) else {
            continue;
        };
        let raw = value.as_text();
        let Ok(parsed) = raw.trim().trim_end_matches('%').parse::<Decimal>() else {
            warn!("{}: unparseable benchmark value '{}'", path.display(), raw);
            return Ok(None);
        };
        let pct = if parsed.abs() <= Decimal::ONE {
            parsed * Decimal::from(100)
        } else {
            parsed
        };
        return Ok(Some(pct));
    }

    Ok(None)
}
