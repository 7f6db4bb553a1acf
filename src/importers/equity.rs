//! Unit asset export reader (单元资产账户资产导出)

use rust_decimal::Decimal;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::importers::schema::{self, UNIT_ASSET};
use crate::importers::sheet;

/// One unit's equity-side assets as exported
#[derive(Debug, Clone, PartialEq)]
pub struct EquityAssetRow {
    pub unit: String,
    pub total_asset: Decimal,
    pub stock_market_value: Decimal,
    pub bond_market_value: Decimal,
}

/// Parse a unit asset export. Invalid rows (empty unit, unparseable or
/// non-positive totals) are dropped, not fatal.
pub fn read_unit_assets(path: &Path) -> Result<Vec<EquityAssetRow>> {
    let file_label = path.display().to_string();
    let table = sheet::read_table(path)?;
    let normalized = schema::normalize(&table, &UNIT_ASSET, &file_label)?;

    if normalized.dropped > 0 {
        warn!("{}: dropped {} invalid rows", file_label, normalized.dropped);
    }

    let rows: Vec<EquityAssetRow> = normalized
        .rows
        .iter()
        .filter_map(|row| {
            Some(EquityAssetRow {
                unit: row.text("unit_name")?.to_string(),
                total_asset: row.amount("total_asset")?,
                stock_market_value: row.amount_or_zero("stock_asset"),
                bond_market_value: row.amount_or_zero("bond_asset"),
            })
        })
        .collect();

    info!("{}: parsed {} unit asset rows", file_label, rows.len());
    Ok(rows)
}
