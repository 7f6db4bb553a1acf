//! Positions export reader (单元资产账户持仓导出)
//!
//! Per-product stock positions; consumed by the scan surface and any
//! holdings view built on top of the core.

use rust_decimal::Decimal;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::importers::schema::{self, UNIT_POSITIONS};
use crate::importers::sheet;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub product: String,
    pub stock_code: String,
    pub stock_name: Option<String>,
    pub market_value: Decimal,
    pub change_pct: Option<Decimal>,
}

/// Parse a positions export. Rows without a positive market value are
/// dropped (closed lines export as zero-value placeholders).
pub fn read_positions(path: &Path) -> Result<Vec<PositionRow>> {
    let file_label = path.display().to_string();
    let table = sheet::read_table(path)?;
    let normalized = schema::normalize(&table, &UNIT_POSITIONS, &file_label)?;

    if normalized.dropped > 0 {
        warn!("{}: dropped {} invalid rows", file_label, normalized.dropped);
    }

    let rows: Vec<PositionRow> = normalized
        .rows
        .iter()
        .filter_map(|row| {
            Some(PositionRow {
                product: row.text("product_name")?.to_string(),
                // Codes export as numbers; re-pad to the 6-digit form
                stock_code: format!("{:0>6}", row.text("stock_code")?),
                stock_name: row.text("stock_name").map(str::to_string),
                market_value: row.amount("market_value")?,
                change_pct: row.amount("change_pct"),
            })
        })
        .collect();

    info!("{}: parsed {} position rows", file_label, rows.len());
    Ok(rows)
}
