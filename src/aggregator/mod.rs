//! Asset aggregation
//!
//! Combines the equity and futures feeds for one trading date into one
//! snapshot per unit. Outer join on unit name: a unit present on only
//! one side keeps zeros for the other. Duplicate unit rows within a feed
//! (sub-accounts exported separately) are summed.

use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::importers::{EquityAssetRow, FuturesAssetRow};

/// Combined assets for one unit on one trading date. Value object:
/// recomputed from source files on every pass, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub unit: String,
    pub equity_total_asset: Decimal,
    pub futures_total_asset: Decimal,
    pub stock_market_value: Decimal,
    pub bond_market_value: Decimal,
}

impl AssetSnapshot {
    /// 总市值 = stock + bond market value
    pub fn total_market_value(&self) -> Decimal {
        self.stock_market_value + self.bond_market_value
    }

    /// 资产汇总 = equity + futures total asset
    pub fn asset_summary(&self) -> Decimal {
        self.equity_total_asset + self.futures_total_asset
    }
}

/// Outer-join equity and futures rows into per-unit snapshots, sorted by
/// unit name for deterministic output.
pub fn aggregate(
    equity_rows: Vec<EquityAssetRow>,
    futures_rows: Vec<FuturesAssetRow>,
) -> Vec<AssetSnapshot> {
    let mut merged: BTreeMap<String, AssetSnapshot> = BTreeMap::new();

    for (unit, rows) in &equity_rows.into_iter().chunk_by(|r| r.unit.clone()) {
        let entry = merged.entry(unit.clone()).or_insert_with(|| empty(&unit));
        for row in rows {
            entry.equity_total_asset += row.total_asset;
            entry.stock_market_value += row.stock_market_value;
            entry.bond_market_value += row.bond_market_value;
        }
    }

    for (unit, rows) in &futures_rows.into_iter().chunk_by(|r| r.unit.clone()) {
        let entry = merged.entry(unit.clone()).or_insert_with(|| empty(&unit));
        for row in rows {
            entry.futures_total_asset += row.futures_equity;
        }
    }

    merged.into_values().collect()
}

fn empty(unit: &str) -> AssetSnapshot {
    AssetSnapshot {
        unit: unit.to_string(),
        equity_total_asset: Decimal::ZERO,
        futures_total_asset: Decimal::ZERO,
        stock_market_value: Decimal::ZERO,
        bond_market_value: Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn equity(unit: &str, total: Decimal, stock: Decimal, bond: Decimal) -> EquityAssetRow {
        EquityAssetRow {
            unit: unit.to_string(),
            total_asset: total,
            stock_market_value: stock,
            bond_market_value: bond,
        }
    }

    fn futures(unit: &str, equity: Decimal) -> FuturesAssetRow {
        FuturesAssetRow {
            unit: unit.to_string(),
            futures_equity: equity,
            futures_market_value: Decimal::ZERO,
        }
    }

    #[test]
    fn test_outer_join_defaults_missing_side_to_zero() {
        let snapshots = aggregate(
            vec![equity("甲单元", dec!(1000000), dec!(800000), dec!(50000))],
            vec![futures("乙单元", dec!(200000))],
        );

        assert_eq!(snapshots.len(), 2);
        let a = snapshots.iter().find(|s| s.unit == "甲单元").unwrap();
        assert_eq!(a.equity_total_asset, dec!(1000000));
        assert_eq!(a.futures_total_asset, dec!(0));
        assert_eq!(a.asset_summary(), dec!(1000000));
        assert_eq!(a.total_market_value(), dec!(850000));

        let b = snapshots.iter().find(|s| s.unit == "乙单元").unwrap();
        assert_eq!(b.equity_total_asset, dec!(0));
        assert_eq!(b.futures_total_asset, dec!(200000));
        assert_eq!(b.asset_summary(), dec!(200000));
    }

    #[test]
    fn test_both_sides_sum_into_asset_summary() {
        let snapshots = aggregate(
            vec![equity("甲单元", dec!(1000000), dec!(0), dec!(0))],
            vec![futures("甲单元", dec!(250000))],
        );
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].asset_summary(), dec!(1250000));
    }

    #[test]
    fn test_duplicate_unit_rows_are_summed() {
        // Sub-accounts export as separate rows for the same unit
        let snapshots = aggregate(
            vec![
                equity("甲单元", dec!(600000), dec!(400000), dec!(0)),
                equity("甲单元", dec!(400000), dec!(300000), dec!(10000)),
            ],
            vec![futures("甲单元", dec!(100000)), futures("甲单元", dec!(50000))],
        );

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].equity_total_asset, dec!(1000000));
        assert_eq!(snapshots[0].stock_market_value, dec!(700000));
        assert_eq!(snapshots[0].futures_total_asset, dec!(150000));
    }

    #[test]
    fn test_aggregate_is_deterministic_and_idempotent() {
        let make = || {
            aggregate(
                vec![
                    equity("乙单元", dec!(2), dec!(1), dec!(0)),
                    equity("甲单元", dec!(1), dec!(0), dec!(0)),
                ],
                vec![futures("丙单元", dec!(3))],
            )
        };
        let first = make();
        let second = make();
        assert_eq!(first, second);
        // BTreeMap ordering keeps output stable across runs
        let units: Vec<&str> = first.iter().map(|s| s.unit.as_str()).collect();
        let mut sorted = units.clone();
        sorted.sort();
        assert_eq!(units, sorted);
    }
}
