//! Return engine
//!
//! Drives the full pipeline behind "what is unit X's return right now":
//! probe the time-sliced cache, and on miss locate the freshest exports,
//! normalize them, merge equity and futures per unit, pull the day's net
//! cash flow from the ledger, and compute the adjusted return.
//!
//! The engine holds no mutable state beyond the SQLite stores; callers
//! pass explicit (unit, source) arguments per request.

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::aggregator::{aggregate, AssetSnapshot};
use crate::cache::{Computed, SlotCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SourcePaths};
use crate::db;
use crate::error::{FundError, Result};
use crate::importers::{
    read_account_total_asset, read_benchmark_return, read_futures_assets, read_positions,
    read_unit_assets, DEFAULT_BENCHMARK,
};
use crate::locator::{latest_account_file, ExportKind, SourceLocator};
use crate::returns::compute_return;

/// Cached computation result for one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnPayload {
    pub unit: String,
    /// `None` when the return is undefined (no positive base asset)
    pub return_pct: Option<Decimal>,
    pub total_asset_today: Decimal,
    pub total_asset_yesterday: Decimal,
    pub net_flow: Decimal,
    pub trade_date: NaiveDate,
    pub prev_trade_date: NaiveDate,
    pub benchmark_return: Option<Decimal>,
}

/// Payload plus serving metadata
#[derive(Debug, Clone, Serialize)]
pub struct UnitReturn {
    pub source: String,
    #[serde(flatten)]
    pub payload: ReturnPayload,
    pub computed_at: NaiveDateTime,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit: String,
    pub reason: String,
}

/// Outcome of a whole-source computation: per-unit successes, per-unit
/// failures, and export files that were skipped as unreadable. Nothing
/// in here aborts the batch.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub source: String,
    pub trade_date: NaiveDate,
    pub prev_trade_date: NaiveDate,
    pub succeeded: Vec<UnitReturn>,
    pub failed: Vec<UnitFailure>,
    pub skipped_files: Vec<String>,
}

/// One day's merged view of a source
struct DayAssets {
    snapshots: BTreeMap<String, AssetSnapshot>,
    freshest: Option<NaiveDateTime>,
    benchmark_return: Option<Decimal>,
    skipped_files: Vec<String>,
}

struct SourceMerge {
    trade_date: NaiveDate,
    prev_trade_date: NaiveDate,
    today: DayAssets,
    yesterday: DayAssets,
}

impl SourceMerge {
    /// Freshness watermark of the inputs: today's files decide it
    fn source_file_time(&self) -> Option<NaiveDateTime> {
        self.today.freshest
    }
}

pub struct ReturnEngine<C: Clock = SystemClock> {
    config: Config,
    conn: Connection,
    clock: C,
}

impl ReturnEngine<SystemClock> {
    /// Open the engine with the wall clock. Applies the schema
    /// idempotently and runs the one-day cache hygiene sweep.
    pub fn open(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        Self::with_clock(config, db_path, SystemClock)
    }
}

impl<C: Clock> ReturnEngine<C> {
    pub fn with_clock(config: Config, db_path: Option<PathBuf>, clock: C) -> Result<Self> {
        let path = match db_path.or_else(|| config.db_path.clone()) {
            Some(p) => p,
            None => db::get_default_db_path()?,
        };
        let conn = db::open_db(Some(path))?;
        conn.execute_batch(include_str!("../db/schema.sql"))?;

        let engine = Self {
            config,
            conn,
            clock,
        };
        SlotCache::new(&engine.conn, &engine.clock).purge_stale()?;
        Ok(engine)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn locator(&self, paths: &SourcePaths) -> SourceLocator {
        SourceLocator::new(paths.asset_root.clone(), paths.futures_root.clone())
    }

    /// Cached return for one unit
    pub fn unit_return(&self, unit: &str, source: &str) -> Result<UnitReturn> {
        let paths = self.config.source(source)?.clone();
        let locator = self.locator(&paths);
        let today = self.clock.now().date();

        let cache = SlotCache::new(&self.conn, &self.clock);
        let probe = || match locator.current_trading_date(today)? {
            Some(date) => locator.freshest_export_time(date),
            None => Ok(None),
        };
        let (payload, from_cache) = cache.get_or_compute(unit, source, probe, || {
            let merge = self.merge_source(&locator, &paths)?;
            let payload = self.build_payload(&merge, unit)?.ok_or_else(|| {
                anyhow!(FundError::NoData(format!(
                    "unit '{}' not present in {} exports for {}",
                    unit, source, merge.trade_date
                )))
            })?;
            Ok(Computed {
                source_file_time: merge.source_file_time(),
                value: payload,
            })
        })?;

        Ok(UnitReturn {
            source: source.to_string(),
            payload,
            computed_at: self.clock.now(),
            from_cache,
        })
    }

    /// Returns for every unit in a source. One merge pass feeds all
    /// units; each result is upserted into the cache for the current
    /// slot (last writer wins).
    pub fn source_returns(&self, source: &str) -> Result<BatchReport> {
        let paths = self.config.source(source)?.clone();
        let locator = self.locator(&paths);
        let merge = self.merge_source(&locator, &paths)?;

        let cache = SlotCache::new(&self.conn, &self.clock);
        let slot = cache.current_slot();
        let computed_at = self.clock.now();

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        // Union of both days so a unit that vanished today is reported,
        // not silently dropped
        let mut units: Vec<&String> = merge.today.snapshots.keys().collect();
        for unit in merge.yesterday.snapshots.keys() {
            if !merge.today.snapshots.contains_key(unit) {
                units.push(unit);
            }
        }

        for unit in units {
            match self.build_payload(&merge, unit) {
                Ok(Some(payload)) => {
                    cache.store(
                        unit,
                        source,
                        &slot,
                        &Computed {
                            source_file_time: merge.source_file_time(),
                            value: payload.clone(),
                        },
                    )?;
                    succeeded.push(UnitReturn {
                        source: source.to_string(),
                        payload,
                        computed_at,
                        from_cache: false,
                    });
                }
                Ok(None) => failed.push(UnitFailure {
                    unit: unit.clone(),
                    reason: format!("no data for {}", merge.trade_date),
                }),
                Err(e) => failed.push(UnitFailure {
                    unit: unit.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        info!(
            "{}: computed {} unit returns, {} failures",
            source,
            succeeded.len(),
            failed.len()
        );

        let mut skipped_files = merge.today.skipped_files.clone();
        skipped_files.extend(merge.yesterday.skipped_files.clone());

        Ok(BatchReport {
            source: source.to_string(),
            trade_date: merge.trade_date,
            prev_trade_date: merge.prev_trade_date,
            succeeded,
            failed,
            skipped_files,
        })
    }

    /// Resolve trading dates and load both days
    fn merge_source(&self, locator: &SourceLocator, paths: &SourcePaths) -> Result<SourceMerge> {
        let today = self.clock.now().date();
        let trade_date = locator.current_trading_date(today)?.ok_or_else(|| {
            anyhow!(FundError::NoData(format!(
                "no export data on or before {}",
                today
            )))
        })?;
        let prev_trade_date = locator.previous_trading_date(trade_date)?.ok_or_else(|| {
            anyhow!(FundError::NoData(format!(
                "no prior trading date with data before {}",
                trade_date
            )))
        })?;

        Ok(SourceMerge {
            trade_date,
            prev_trade_date,
            today: self.load_day(locator, paths, trade_date)?,
            yesterday: self.load_day(locator, paths, prev_trade_date)?,
        })
    }

    /// Parse and merge one day's exports. Unreadable files are skipped
    /// and named, never fatal; the merge continues with what parsed.
    fn load_day(
        &self,
        locator: &SourceLocator,
        paths: &SourcePaths,
        date: NaiveDate,
    ) -> Result<DayAssets> {
        fn note_time(t: NaiveDateTime, freshest: &mut Option<NaiveDateTime>) {
            *freshest = Some(freshest.map_or(t, |f| f.max(t)));
        }

        let mut skipped_files = Vec::new();
        let mut freshest: Option<NaiveDateTime> = None;

        let equity_rows = match locator.latest_file(ExportKind::UnitAsset, date, None)? {
            Some(file) => match read_unit_assets(&file.path) {
                Ok(rows) => {
                    note_time(file.timestamp, &mut freshest);
                    rows
                }
                Err(e) => {
                    warn!("skipping {}: {:#}", file.path.display(), e);
                    skipped_files.push(format!("{}: {}", file.path.display(), e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut benchmark_return = None;
        let futures_rows = match locator.latest_file(ExportKind::FuturesAsset, date, None)? {
            Some(file) => match read_futures_assets(&file.path) {
                Ok(rows) => {
                    note_time(file.timestamp, &mut freshest);
                    benchmark_return =
                        read_benchmark_return(&file.path, DEFAULT_BENCHMARK).unwrap_or_else(|e| {
                            warn!("benchmark sheet unreadable in {}: {:#}", file.path.display(), e);
                            None
                        });
                    rows
                }
                Err(e) => {
                    warn!("skipping {}: {:#}", file.path.display(), e);
                    skipped_files.push(format!("{}: {}", file.path.display(), e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut snapshots: BTreeMap<String, AssetSnapshot> = aggregate(equity_rows, futures_rows)
            .into_iter()
            .map(|s| (s.unit.clone(), s))
            .collect();

        // Units fed by a standalone terminal take their equity side from
        // the override directory instead of the unit asset export.
        for (unit, dir) in &paths.account_overrides {
            let Some(file) = latest_account_file(dir, date)? else {
                continue;
            };
            match read_account_total_asset(&file.path) {
                Ok(Some(total)) => {
                    note_time(file.timestamp, &mut freshest);
                    let entry = snapshots
                        .entry(unit.clone())
                        .or_insert_with(|| AssetSnapshot {
                            unit: unit.clone(),
                            equity_total_asset: Decimal::ZERO,
                            futures_total_asset: Decimal::ZERO,
                            stock_market_value: Decimal::ZERO,
                            bond_market_value: Decimal::ZERO,
                        });
                    entry.equity_total_asset = total;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("skipping {}: {:#}", file.path.display(), e);
                    skipped_files.push(format!("{}: {}", file.path.display(), e));
                }
            }
        }

        Ok(DayAssets {
            snapshots,
            freshest,
            benchmark_return,
            skipped_files,
        })
    }

    /// Build the cacheable payload for one unit; `None` when the unit
    /// has no data today. A unit absent yesterday computes against a
    /// zero base and reports an undefined return.
    fn build_payload(&self, merge: &SourceMerge, unit: &str) -> Result<Option<ReturnPayload>> {
        let Some(today) = merge.today.snapshots.get(unit) else {
            return Ok(None);
        };
        let yesterday_total = merge
            .yesterday
            .snapshots
            .get(unit)
            .map(AssetSnapshot::asset_summary)
            .unwrap_or(Decimal::ZERO);

        let net_flow = db::net_cash_flow(&self.conn, unit, merge.trade_date)?;
        let outcome = compute_return(today.asset_summary(), yesterday_total, net_flow);

        Ok(Some(ReturnPayload {
            unit: unit.to_string(),
            return_pct: outcome.pct(),
            total_asset_today: today.asset_summary(),
            total_asset_yesterday: yesterday_total,
            net_flow,
            trade_date: merge.trade_date,
            prev_trade_date: merge.prev_trade_date,
            benchmark_return: merge.today.benchmark_return,
        }))
    }

    /// Freshest export files visible for a source right now; the scan
    /// surface behind the `scan` CLI command.
    pub fn scan_source(&self, source: &str) -> Result<ScanReport> {
        let paths = self.config.source(source)?.clone();
        let locator = self.locator(&paths);
        let today = self.clock.now().date();

        let Some(date) = locator.current_trading_date(today)? else {
            return Ok(ScanReport {
                source: source.to_string(),
                date: None,
                unit_asset: None,
                futures_asset: None,
                positions: Vec::new(),
            });
        };

        let unit_asset = locator
            .latest_file(ExportKind::UnitAsset, date, None)?
            .map(|f| ScannedFile {
                path: f.path.display().to_string(),
                timestamp: f.timestamp,
                rows: read_unit_assets(&f.path).map(|r| r.len()).unwrap_or(0),
            });
        let futures_asset = locator
            .latest_file(ExportKind::FuturesAsset, date, None)?
            .map(|f| ScannedFile {
                path: f.path.display().to_string(),
                timestamp: f.timestamp,
                rows: read_futures_assets(&f.path).map(|r| r.len()).unwrap_or(0),
            });

        let mut positions: Vec<ScannedProduct> = locator
            .latest_positions_per_product(date)?
            .into_iter()
            .map(|(product, f)| ScannedProduct {
                product,
                path: f.path.display().to_string(),
                timestamp: f.timestamp,
                rows: read_positions(&f.path).map(|r| r.len()).unwrap_or(0),
            })
            .collect();
        positions.sort_by(|a, b| a.product.cmp(&b.product));

        Ok(ScanReport {
            source: source.to_string(),
            date: Some(date),
            unit_asset,
            futures_asset,
            positions,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ScannedFile {
    pub path: String,
    pub timestamp: NaiveDateTime,
    pub rows: usize,
}

#[derive(Debug, Serialize)]
pub struct ScannedProduct {
    pub product: String,
    pub path: String,
    pub timestamp: NaiveDateTime,
    pub rows: usize,
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub source: String,
    /// `None` when no export data exists within the lookback window
    pub date: Option<NaiveDate>,
    pub unit_asset: Option<ScannedFile>,
    pub futures_asset: Option<ScannedFile>,
    pub positions: Vec<ScannedProduct>,
}
