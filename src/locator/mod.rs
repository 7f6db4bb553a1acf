//! Source locator
//!
//! Export files land in two layouts: a dated tree
//! (`<asset_root>/YYYYMMDD/**`) for unit asset and positions exports, and
//! flat directories for futures and standalone-terminal account exports.
//! Every filename embeds a `YYYYMMDD-HHMMSS` timestamp; several historical
//! naming schemes (underscore or dash before the timestamp, .xlsx or .csv)
//! are all recognized.
//!
//! Missing roots or date folders are empty results, never errors, so the
//! caller can report "no data for this date" instead of failing.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// How many calendar days to walk back when resolving trading dates;
/// bounds the scan over weekends and holiday runs.
const TRADING_DATE_LOOKBACK_DAYS: u64 = 10;

/// Logical export file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// 单元资产账户资产导出 - per-unit equity asset export (dated tree)
    UnitAsset,
    /// 期货资产导出 - futures asset export (flat directory)
    FuturesAsset,
    /// 单元资产账户持仓导出 - per-product positions export (dated tree)
    UnitPositions,
}

/// Intraday export windows. The terminal exports around 11:30 and after
/// 15:00; bucket membership goes by the embedded HHMMSS prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Midday,
    Close,
}

impl TimeBucket {
    fn matches(&self, time: NaiveTime) -> bool {
        let hhmmss = time.format("%H%M%S").to_string();
        match self {
            TimeBucket::Midday => hhmmss.starts_with("1130"),
            TimeBucket::Close => hhmmss.starts_with("15"),
        }
    }
}

/// One matched export file
#[derive(Debug, Clone)]
pub struct LocatedFile {
    pub path: PathBuf,
    /// Timestamp embedded in the filename, not filesystem mtime; exports
    /// are copied between machines and mtime is unreliable.
    pub timestamp: NaiveDateTime,
    /// Product identifier segment, present only for positions exports
    pub product: Option<String>,
}

static UNIT_ASSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^单元资产账户资产导出[_-](\d{8})-(\d{6})\.(?:xlsx|csv)$").unwrap()
});

static FUTURES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^期货资产导出[_-](\d{8})-(\d{6})\.(?:xls|xlsx)$").unwrap());

static POSITIONS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^单元资产账户持仓导出[_-](.+)[_-](\d{8})-(\d{6})\.(?:xlsx|csv)$").unwrap()
});

static ACCOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Account-(\d{8})_(\d{6})\.csv$").unwrap());

fn parse_stamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{}-{}", date, time), "%Y%m%d-%H%M%S").ok()
}

/// Match one filename against the templates for a kind. Returns the
/// embedded timestamp and, for positions exports, the product segment.
pub fn match_filename(kind: ExportKind, name: &str) -> Option<(NaiveDateTime, Option<String>)> {
    match kind {
        ExportKind::UnitAsset => {
            let caps = UNIT_ASSET_RE.captures(name)?;
            Some((parse_stamp(&caps[1], &caps[2])?, None))
        }
        ExportKind::FuturesAsset => {
            let caps = FUTURES_RE.captures(name)?;
            Some((parse_stamp(&caps[1], &caps[2])?, None))
        }
        ExportKind::UnitPositions => {
            let caps = POSITIONS_RE.captures(name)?;
            Some((parse_stamp(&caps[2], &caps[3])?, Some(caps[1].to_string())))
        }
    }
}

/// Recursively collect plain files under a directory. Missing directory
/// is simply no files.
fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn folder_name(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Locator over one data source's export roots
#[derive(Debug, Clone)]
pub struct SourceLocator {
    asset_root: PathBuf,
    futures_root: Option<PathBuf>,
}

impl SourceLocator {
    pub fn new(asset_root: impl Into<PathBuf>, futures_root: Option<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            futures_root,
        }
    }

    /// 8-digit date folders under the asset root, ascending
    pub fn date_folders(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.asset_root) else {
            return Vec::new();
        };
        let mut folders: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.len() == 8 && n.chars().all(|c| c.is_ascii_digit()))
            .collect();
        folders.sort();
        folders
    }

    /// Freshest export of the given kind for a date, optionally restricted
    /// to a time bucket. `Ok(None)` when nothing matches.
    pub fn latest_file(
        &self,
        kind: ExportKind,
        date: NaiveDate,
        bucket: Option<TimeBucket>,
    ) -> Result<Option<LocatedFile>> {
        let mut candidates = self.files_for_date(kind, date);
        if let Some(bucket) = bucket {
            candidates.retain(|f| bucket.matches(f.timestamp.time()));
        }
        Ok(candidates.into_iter().max_by_key(|f| f.timestamp))
    }

    fn files_for_date(&self, kind: ExportKind, date: NaiveDate) -> Vec<LocatedFile> {
        match kind {
            ExportKind::UnitAsset | ExportKind::UnitPositions => {
                let folder = self.asset_root.join(folder_name(date));
                let mut files = Vec::new();
                walk_files(&folder, &mut files);
                files
                    .into_iter()
                    .filter_map(|path| {
                        let (timestamp, product) = match_filename(kind, file_name(&path)?)?;
                        Some(LocatedFile {
                            path,
                            timestamp,
                            product,
                        })
                    })
                    .collect()
            }
            ExportKind::FuturesAsset => self.futures_files_for_date(date),
        }
    }

    /// Futures exports sit in one flat directory across all dates. Prefer
    /// exact-date files; when the requested date has none (futures desks
    /// skip some sessions), fall back to the newest file dated on or
    /// before it, so yesterday's equity still pairs with the closest
    /// futures figure.
    fn futures_files_for_date(&self, date: NaiveDate) -> Vec<LocatedFile> {
        let Some(root) = &self.futures_root else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };

        let all: Vec<LocatedFile> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| !p.is_dir())
            .filter_map(|path| {
                let (timestamp, _) = match_filename(ExportKind::FuturesAsset, file_name(&path)?)?;
                Some(LocatedFile {
                    path,
                    timestamp,
                    product: None,
                })
            })
            .collect();

        let exact: Vec<LocatedFile> = all
            .iter()
            .filter(|f| f.timestamp.date() == date)
            .cloned()
            .collect();
        if !exact.is_empty() {
            return exact;
        }

        debug!("No futures export dated {}, falling back to nearest earlier file", date);
        all.into_iter()
            .filter(|f| f.timestamp.date() <= date)
            .max_by_key(|f| f.timestamp)
            .into_iter()
            .collect()
    }

    /// Newest positions export per product identifier for a date
    pub fn latest_positions_per_product(
        &self,
        date: NaiveDate,
    ) -> Result<HashMap<String, LocatedFile>> {
        let mut latest: HashMap<String, LocatedFile> = HashMap::new();
        for file in self.files_for_date(ExportKind::UnitPositions, date) {
            let Some(product) = file.product.clone() else {
                continue;
            };
            match latest.get(&product) {
                Some(existing) if existing.timestamp >= file.timestamp => {}
                _ => {
                    latest.insert(product, file);
                }
            }
        }
        Ok(latest)
    }

    /// Max embedded timestamp across unit-asset and futures exports for a
    /// date. This is the freshness signal the cache compares against.
    pub fn freshest_export_time(&self, date: NaiveDate) -> Result<Option<NaiveDateTime>> {
        let equity = self.latest_file(ExportKind::UnitAsset, date, None)?;
        let futures = self.latest_file(ExportKind::FuturesAsset, date, None)?;
        Ok([equity, futures]
            .into_iter()
            .flatten()
            .map(|f| f.timestamp)
            .max())
    }

    /// Nearest date on or before `from` with unit-asset data, scanning
    /// back at most 10 calendar days
    pub fn current_trading_date(&self, from: NaiveDate) -> Result<Option<NaiveDate>> {
        for back in 0..=TRADING_DATE_LOOKBACK_DAYS {
            let candidate = from
                .checked_sub_days(Days::new(back))
                .ok_or_else(|| anyhow::anyhow!("date underflow walking back from {}", from))?;
            if self.latest_file(ExportKind::UnitAsset, candidate, None)?.is_some() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Nearest date strictly before `date` with unit-asset data
    pub fn previous_trading_date(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        for back in 1..=TRADING_DATE_LOOKBACK_DAYS {
            let candidate = date
                .checked_sub_days(Days::new(back))
                .ok_or_else(|| anyhow::anyhow!("date underflow walking back from {}", date))?;
            if self.latest_file(ExportKind::UnitAsset, candidate, None)?.is_some() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

/// Freshest `Account-YYYYMMDD_HHMMSS.csv` in a flat directory for a date.
/// These come from the standalone terminal configured per unit.
pub fn latest_account_file(root: &Path, date: NaiveDate) -> Result<Option<LocatedFile>> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Ok(None);
    };
    let wanted = folder_name(date);
    Ok(entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| !p.is_dir())
        .filter_map(|path| {
            let caps = ACCOUNT_RE.captures(file_name(&path)?)?;
            if &caps[1] != wanted.as_str() {
                return None;
            }
            let timestamp = parse_stamp(&caps[1], &caps[2])?;
            Some(LocatedFile {
                path,
                timestamp,
                product: None,
            })
        })
        .max_by_key(|f| f.timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y%m%d-%H%M%S").unwrap()
    }

    #[test]
    fn test_unit_asset_template_both_separators() {
        for name in [
            "单元资产账户资产导出_20250822-150012.xlsx",
            "单元资产账户资产导出-20250822-150012.xlsx",
            "单元资产账户资产导出_20250822-150012.csv",
        ] {
            let (ts, product) = match_filename(ExportKind::UnitAsset, name).unwrap();
            assert_eq!(ts, stamp("20250822-150012"));
            assert!(product.is_none());
        }
        assert!(match_filename(ExportKind::UnitAsset, "单元资产账户资产导出_20250822.xlsx").is_none());
        assert!(match_filename(ExportKind::UnitAsset, "notes.txt").is_none());
    }

    #[test]
    fn test_positions_template_keeps_product_with_underscores() {
        let (ts, product) = match_filename(
            ExportKind::UnitPositions,
            "单元资产账户持仓导出_开源ATX_普通1_20250625-121200.xlsx",
        )
        .unwrap();
        assert_eq!(ts, stamp("20250625-121200"));
        assert_eq!(product.as_deref(), Some("开源ATX_普通1"));
    }

    #[test]
    fn test_futures_template_accepts_legacy_xls() {
        let (ts, _) =
            match_filename(ExportKind::FuturesAsset, "期货资产导出_20250701-150000.xls").unwrap();
        assert_eq!(ts, stamp("20250701-150000"));
    }

    #[test]
    fn test_time_buckets_follow_embedded_prefix() {
        let midday = NaiveTime::from_hms_opt(11, 30, 45).unwrap();
        let close = NaiveTime::from_hms_opt(15, 0, 12).unwrap();
        let late_close = NaiveTime::from_hms_opt(15, 58, 0).unwrap();
        let other = NaiveTime::from_hms_opt(14, 59, 59).unwrap();

        assert!(TimeBucket::Midday.matches(midday));
        assert!(!TimeBucket::Midday.matches(close));
        assert!(TimeBucket::Close.matches(close));
        assert!(TimeBucket::Close.matches(late_close));
        assert!(!TimeBucket::Close.matches(other));
        assert!(!TimeBucket::Close.matches(midday));
    }

    #[test]
    fn test_missing_root_is_empty_not_error() {
        let locator = SourceLocator::new("/definitely/not/here", None);
        assert!(locator.date_folders().is_empty());
        let date = NaiveDate::from_ymd_opt(2025, 8, 22).unwrap();
        assert!(locator
            .latest_file(ExportKind::UnitAsset, date, None)
            .unwrap()
            .is_none());
        assert!(locator.current_trading_date(date).unwrap().is_none());
    }
}
