//! Time-sliced result cache
//!
//! Memoizes expensive multi-file computations per (unit, data source,
//! time slot). Slots are 15 minutes wide during trading hours and an
//! hour wide otherwise, and entries carry a TTL of the same width. A
//! TTL alone is not enough: an entry is also invalid the moment the
//! locator sees an export file newer than the one the entry was built
//! from, so fresh data lands mid-window instead of after it.
//!
//! Racing fills of one key resolve last-writer-wins; the payload is a
//! pure function of the input files, so either write is equivalent.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::db::{self, CacheEntry};
use crate::error::Result;

/// Mon-Fri, 09:30 inclusive to 15:00 exclusive, local exchange time
pub fn is_trading_hours(t: NaiveDateTime) -> bool {
    let weekday = matches!(
        t.weekday(),
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri
    );
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
    weekday && t.time() >= open && t.time() < close
}

/// TTL for entries written at this instant
pub fn cache_window(t: NaiveDateTime) -> Duration {
    if is_trading_hours(t) {
        Duration::minutes(15)
    } else {
        Duration::minutes(60)
    }
}

/// Slot label for this instant: 15-minute floor during trading hours,
/// hourly floor otherwise. E.g. `20250822-0945`, `20250822-1600`.
pub fn time_slot_label(t: NaiveDateTime) -> String {
    let minute = if is_trading_hours(t) {
        t.minute() / 15 * 15
    } else {
        0
    };
    format!("{}{:02}", t.format("%Y%m%d-%H"), minute)
}

/// Stable key over (unit, source, slot)
pub fn cache_key(unit: &str, source: &str, time_slot: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(unit.as_bytes());
    hasher.update(b"|");
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(time_slot.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// A computed payload plus the freshness watermark of its inputs
#[derive(Debug)]
pub struct Computed<T> {
    pub value: T,
    /// Embedded timestamp of the freshest export file read during the
    /// computation
    pub source_file_time: Option<NaiveDateTime>,
}

/// Cache facade over the persisted store
pub struct SlotCache<'a, C: Clock> {
    conn: &'a Connection,
    clock: &'a C,
}

impl<'a, C: Clock> SlotCache<'a, C> {
    pub fn new(conn: &'a Connection, clock: &'a C) -> Self {
        Self { conn, clock }
    }

    /// Serve a cached payload or compute a fresh one.
    ///
    /// `probe` reports the freshest export timestamp currently on disk
    /// (cheap directory scan); it runs only when a live entry exists. A
    /// hit requires the entry to be unexpired AND at least as fresh as
    /// the probe. `compute` errors propagate and are never cached.
    ///
    /// Returns the payload and whether it came from cache.
    pub fn get_or_compute<T, P, F>(
        &self,
        unit: &str,
        source: &str,
        probe: P,
        compute: F,
    ) -> Result<(T, bool)>
    where
        T: Serialize + DeserializeOwned,
        P: FnOnce() -> Result<Option<NaiveDateTime>>,
        F: FnOnce() -> Result<Computed<T>>,
    {
        let now = self.clock.now();
        let slot = time_slot_label(now);
        let key = cache_key(unit, source, &slot);

        if let Some(entry) = db::get_cache_entry(self.conn, &key)? {
            if now < entry.expires_at {
                let newest_on_disk = probe()?;
                let fresh = match (newest_on_disk, entry.source_file_time) {
                    // Nothing newer on disk than what the entry used
                    (Some(latest), Some(used)) => latest <= used,
                    // No exports on disk at all; entry still describes them
                    (None, _) => true,
                    // Entry has no watermark to compare; recompute
                    (Some(_), None) => false,
                };
                if fresh {
                    debug!("cache hit for {} / {} @ {}", unit, source, slot);
                    let value = serde_json::from_str(&entry.payload)?;
                    return Ok((value, true));
                }
                debug!("cache entry for {} superseded by newer export", unit);
            }
        }

        let computed = compute()?;
        self.store(unit, source, &slot, &computed)?;
        Ok((computed.value, false))
    }

    /// Write one entry for the current slot. Used by `get_or_compute`
    /// and by batch computations that fill many units from one merge.
    pub fn store<T: Serialize>(
        &self,
        unit: &str,
        source: &str,
        time_slot: &str,
        computed: &Computed<T>,
    ) -> Result<()> {
        let now = self.clock.now();
        let entry = CacheEntry {
            cache_key: cache_key(unit, source, time_slot),
            unit_name: unit.to_string(),
            data_source: source.to_string(),
            time_slot: time_slot.to_string(),
            payload: serde_json::to_string(&computed.value)?,
            source_file_time: computed.source_file_time,
            created_at: now,
            expires_at: now + cache_window(now),
        };
        db::upsert_cache_entry(self.conn, &entry)
    }

    /// Current slot label per the injected clock
    pub fn current_slot(&self) -> String {
        time_slot_label(self.clock.now())
    }

    /// Storage hygiene, run at engine start: drop entries older than a
    /// day. Expiry and freshness are still enforced at read time.
    pub fn purge_stale(&self) -> Result<usize> {
        let cutoff = self.clock.now() - Duration::days(1);
        let purged = db::purge_cache_created_before(self.conn, cutoff)?;
        if purged > 0 {
            info!("cache purge removed {} entries", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("../db/schema.sql")).unwrap();
        conn
    }

    #[test]
    fn test_trading_hours_boundaries() {
        // 2025-08-22 is a Friday, 2025-08-23 a Saturday
        assert!(is_trading_hours(at(2025, 8, 22, 9, 30)));
        assert!(is_trading_hours(at(2025, 8, 22, 14, 59)));
        assert!(!is_trading_hours(at(2025, 8, 22, 9, 29)));
        assert!(!is_trading_hours(at(2025, 8, 22, 15, 0)));
        assert!(!is_trading_hours(at(2025, 8, 23, 10, 0)));
    }

    #[test]
    fn test_slot_labels_floor_by_window() {
        assert_eq!(time_slot_label(at(2025, 8, 22, 10, 7)), "20250822-1000");
        assert_eq!(time_slot_label(at(2025, 8, 22, 10, 22)), "20250822-1015");
        assert_eq!(time_slot_label(at(2025, 8, 22, 14, 59)), "20250822-1445");
        // After hours and weekends floor to the hour
        assert_eq!(time_slot_label(at(2025, 8, 22, 16, 45)), "20250822-1600");
        assert_eq!(time_slot_label(at(2025, 8, 23, 10, 22)), "20250823-1000");
    }

    #[test]
    fn test_window_width_follows_trading_hours() {
        assert_eq!(cache_window(at(2025, 8, 22, 10, 0)), Duration::minutes(15));
        assert_eq!(cache_window(at(2025, 8, 22, 20, 0)), Duration::minutes(60));
        assert_eq!(cache_window(at(2025, 8, 23, 10, 0)), Duration::minutes(60));
    }

    #[test]
    fn test_cache_key_distinct_per_component() {
        let a = cache_key("u1", "live", "20250822-1000");
        assert_eq!(a, cache_key("u1", "live", "20250822-1000"));
        assert_ne!(a, cache_key("u2", "live", "20250822-1000"));
        assert_ne!(a, cache_key("u1", "sim", "20250822-1000"));
        assert_ne!(a, cache_key("u1", "live", "20250822-1015"));
    }

    #[test]
    fn test_hit_then_recompute_on_newer_file() {
        let conn = test_conn();
        let clock = FixedClock(at(2025, 8, 22, 10, 0));
        let cache = SlotCache::new(&conn, &clock);
        let file_time = at(2025, 8, 22, 9, 45);

        let (value, from_cache) = cache
            .get_or_compute(
                "u",
                "live",
                || Ok(Some(file_time)),
                || {
                    Ok(Computed {
                        value: 41i64,
                        source_file_time: Some(file_time),
                    })
                },
            )
            .unwrap();
        assert_eq!((value, from_cache), (41, false));

        // Same slot, same file on disk: served from cache
        let (value, from_cache) = cache
            .get_or_compute::<i64, _, _>(
                "u",
                "live",
                || Ok(Some(file_time)),
                || panic!("must not recompute on a fresh hit"),
            )
            .unwrap();
        assert_eq!((value, from_cache), (41, true));

        // A newer export landed inside the TTL window: recompute
        let newer = at(2025, 8, 22, 10, 1);
        let (value, from_cache) = cache
            .get_or_compute(
                "u",
                "live",
                || Ok(Some(newer)),
                || {
                    Ok(Computed {
                        value: 42i64,
                        source_file_time: Some(newer),
                    })
                },
            )
            .unwrap();
        assert_eq!((value, from_cache), (42, false));
    }

    #[test]
    fn test_slot_rollover_recomputes() {
        let conn = test_conn();
        let file_time = at(2025, 8, 22, 9, 45);

        let early = FixedClock(at(2025, 8, 22, 10, 0));
        SlotCache::new(&conn, &early)
            .get_or_compute(
                "u",
                "live",
                || Ok(Some(file_time)),
                || {
                    Ok(Computed {
                        value: 1i64,
                        source_file_time: Some(file_time),
                    })
                },
            )
            .unwrap();

        // 20:00 keys a different (hourly) slot; the morning entry does
        // not apply and a fresh compute runs
        let late = FixedClock(at(2025, 8, 22, 20, 0));
        let (value, from_cache) = SlotCache::new(&conn, &late)
            .get_or_compute(
                "u",
                "live",
                || Ok(Some(file_time)),
                || {
                    Ok(Computed {
                        value: 2i64,
                        source_file_time: Some(file_time),
                    })
                },
            )
            .unwrap();
        assert_eq!((value, from_cache), (2, false));
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let conn = test_conn();
        let clock = FixedClock(at(2025, 8, 22, 10, 0));
        let cache = SlotCache::new(&conn, &clock);

        let result = cache.get_or_compute::<i64, _, _>(
            "u",
            "live",
            || Ok(None),
            || Err(anyhow::anyhow!("exports unreadable")),
        );
        assert!(result.is_err());

        // The failure left nothing behind; the next call computes fresh
        let (value, from_cache) = cache
            .get_or_compute(
                "u",
                "live",
                || Ok(None),
                || {
                    Ok(Computed {
                        value: 7i64,
                        source_file_time: None,
                    })
                },
            )
            .unwrap();
        assert_eq!((value, from_cache), (7, false));
    }

    #[test]
    fn test_purge_removes_only_old_entries() {
        let conn = test_conn();
        let day1 = FixedClock(at(2025, 8, 21, 9, 0));
        SlotCache::new(&conn, &day1)
            .store(
                "u",
                "live",
                "20250821-0900",
                &Computed {
                    value: 1i64,
                    source_file_time: None,
                },
            )
            .unwrap();

        let day2 = FixedClock(at(2025, 8, 22, 10, 0));
        SlotCache::new(&conn, &day2)
            .store(
                "u",
                "live",
                "20250822-1000",
                &Computed {
                    value: 2i64,
                    source_file_time: None,
                },
            )
            .unwrap();

        assert_eq!(SlotCache::new(&conn, &day2).purge_stale().unwrap(), 1);
    }
}
