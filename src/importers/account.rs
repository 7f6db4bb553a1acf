//! Standalone terminal account export reader (Account-*.csv)
//!
//! Single-account files: one data row, one interesting column. Used for
//! units whose equity feed is overridden in the source config.

use rust_decimal::Decimal;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::importers::schema::{self, ACCOUNT};
use crate::importers::sheet;

/// Total asset figure from an account export; `Ok(None)` when the file
/// has no valid data row.
pub fn read_account_total_asset(path: &Path) -> Result<Option<Decimal>> {
    let file_label = path.display().to_string();
    let table = sheet::read_table(path)?;
    let normalized = schema::normalize(&table, &ACCOUNT, &file_label)?;

    // Take the first valid row; these exports describe one account.
    let total = normalized.rows.first().and_then(|row| row.amount("total_asset"));
    if let Some(total) = total {
        info!("{}: account total asset {}", file_label, total);
    }
    Ok(total)
}
