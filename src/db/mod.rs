// Database module - SQLite connection, cash-flow ledger, cache store

pub mod models;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

pub use models::{CacheEntry, CashFlowEvent, FlowType};

/// Get the default database path (~/.fundlens/data.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    Ok(crate::config::fundlens_home()?.join("data.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = db_path.unwrap_or(get_default_db_path()?);
    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;

    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Creates the database file and runs the schema SQL to set up all
/// tables and indexes.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or(get_default_db_path()?);

    info!("Initializing database at: {:?}", path);

    let conn = open_db(Some(path))?;

    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;

    info!("Database initialized successfully");
    Ok(())
}

/// Read a TEXT column as Decimal
pub fn get_decimal_value(row: &rusqlite::Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

// ---------------------------------------------------------------------------
// Cash-flow ledger
// ---------------------------------------------------------------------------

/// Record a capital movement. Upsert semantics: an existing row with the
/// same (unit, date, direction) is replaced, amount and note both.
/// Callers wanting to accumulate must read-modify-write.
pub fn add_cash_flow(
    conn: &Connection,
    unit: &str,
    date: NaiveDate,
    flow_type: FlowType,
    amount: Decimal,
    note: Option<&str>,
) -> Result<()> {
    if amount <= Decimal::ZERO {
        anyhow::bail!(crate::error::FundError::ParseError(format!(
            "cash flow amount must be positive, got {}",
            amount
        )));
    }

    conn.execute(
        "INSERT INTO cash_flows (unit_name, flow_date, flow_type, amount, note)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (unit_name, flow_date, flow_type)
         DO UPDATE SET amount = excluded.amount, note = excluded.note",
        params![unit, date, flow_type.as_str(), amount.to_string(), note],
    )?;

    Ok(())
}

/// Delete the ledger row matching (unit, date, direction, amount) exactly.
/// Returns true if a row was removed.
pub fn remove_cash_flow(
    conn: &Connection,
    unit: &str,
    date: NaiveDate,
    flow_type: FlowType,
    amount: Decimal,
) -> Result<bool> {
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, amount FROM cash_flows
             WHERE unit_name = ?1 AND flow_date = ?2 AND flow_type = ?3",
            params![unit, date, flow_type.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, stored)) = existing else {
        return Ok(false);
    };

    // Compare as decimals so "100" matches "100.00"
    let stored = Decimal::from_str(&stored)
        .context("Failed to parse stored cash flow amount")?;
    if stored != amount {
        return Ok(false);
    }

    conn.execute("DELETE FROM cash_flows WHERE id = ?1", params![id])?;
    Ok(true)
}

/// Delete every ledger row for a unit. Returns the number removed.
pub fn delete_all_cash_flows(conn: &Connection, unit: &str) -> Result<usize> {
    let n = conn.execute("DELETE FROM cash_flows WHERE unit_name = ?1", params![unit])?;
    Ok(n)
}

/// Net capital movement for a unit on a date: inflow - outflow, zero when
/// the ledger has no rows.
pub fn net_cash_flow(conn: &Connection, unit: &str, date: NaiveDate) -> Result<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT flow_type, amount FROM cash_flows
         WHERE unit_name = ?1 AND flow_date = ?2",
    )?;

    let mut rows = stmt.query(params![unit, date])?;
    let mut net = Decimal::ZERO;

    while let Some(row) = rows.next()? {
        let flow_type: String = row.get(0)?;
        let amount = get_decimal_value(row, 1).context("Failed to parse cash flow amount")?;
        match flow_type.parse::<FlowType>() {
            Ok(FlowType::Inflow) => net += amount,
            Ok(FlowType::Outflow) => net -= amount,
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Unknown flow type '{}' while computing net flow",
                    flow_type
                ));
            }
        }
    }

    Ok(net)
}

/// All ledger rows for a unit, newest date first
pub fn list_cash_flows(conn: &Connection, unit: &str) -> Result<Vec<CashFlowEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, unit_name, flow_date, flow_type, amount, note, created_at
         FROM cash_flows
         WHERE unit_name = ?1
         ORDER BY flow_date DESC, flow_type ASC",
    )?;

    let mut rows = stmt.query(params![unit])?;
    let mut events = Vec::new();

    while let Some(row) = rows.next()? {
        let flow_type: String = row.get(3)?;
        let flow_type = flow_type.parse::<FlowType>().map_err(|_| {
            anyhow::anyhow!("Unknown flow type '{}' in ledger row", flow_type)
        })?;
        events.push(CashFlowEvent {
            id: Some(row.get(0)?),
            unit_name: row.get(1)?,
            flow_date: row.get(2)?,
            flow_type,
            amount: get_decimal_value(row, 4).context("Failed to parse cash flow amount")?,
            note: row.get(5)?,
            created_at: row.get(6)?,
        });
    }

    Ok(events)
}

// ---------------------------------------------------------------------------
// Realtime cache store
// ---------------------------------------------------------------------------

pub fn get_cache_entry(conn: &Connection, cache_key: &str) -> Result<Option<CacheEntry>> {
    let entry = conn
        .query_row(
            "SELECT cache_key, unit_name, data_source, time_slot, payload,
                    source_file_time, created_at, expires_at
             FROM realtime_cache WHERE cache_key = ?1",
            params![cache_key],
            |row| {
                Ok(CacheEntry {
                    cache_key: row.get(0)?,
                    unit_name: row.get(1)?,
                    data_source: row.get(2)?,
                    time_slot: row.get(3)?,
                    payload: row.get(4)?,
                    source_file_time: row.get(5)?,
                    created_at: row.get(6)?,
                    expires_at: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

/// Insert or replace a cache entry. Racing fills of the same key resolve
/// last-writer-wins; the payload is a pure function of the same input
/// files, so either write is valid.
pub fn upsert_cache_entry(conn: &Connection, entry: &CacheEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO realtime_cache
            (cache_key, unit_name, data_source, time_slot, payload,
             source_file_time, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (cache_key) DO UPDATE SET
            payload = excluded.payload,
            source_file_time = excluded.source_file_time,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at",
        params![
            entry.cache_key,
            entry.unit_name,
            entry.data_source,
            entry.time_slot,
            entry.payload,
            entry.source_file_time,
            entry.created_at,
            entry.expires_at,
        ],
    )?;
    Ok(())
}

/// Storage hygiene: drop entries created before the cutoff. Correctness
/// does not depend on this; expiry and freshness are checked at read time.
pub fn purge_cache_created_before(conn: &Connection, cutoff: NaiveDateTime) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM realtime_cache WHERE created_at < ?1",
        params![cutoff],
    )?;
    if n > 0 {
        info!("Purged {} cache entries older than {}", n, cutoff);
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("schema.sql")).unwrap();
        conn
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_add_flow_replaces_same_key() {
        let conn = test_conn();
        add_cash_flow(&conn, "甲单元", d("2025-08-22"), FlowType::Inflow, dec!(100), None).unwrap();
        add_cash_flow(&conn, "甲单元", d("2025-08-22"), FlowType::Inflow, dec!(150), None).unwrap();

        let flows = list_cash_flows(&conn, "甲单元").unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].amount, dec!(150));
    }

    #[test]
    fn test_net_flow_is_inflow_minus_outflow() {
        let conn = test_conn();
        add_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Inflow, dec!(40000), None).unwrap();
        add_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Outflow, dec!(15000), None).unwrap();

        assert_eq!(net_cash_flow(&conn, "u", d("2025-08-22")).unwrap(), dec!(25000));
        // No rows -> zero, not an error
        assert_eq!(net_cash_flow(&conn, "u", d("2025-08-23")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_remove_flow_requires_exact_amount() {
        let conn = test_conn();
        add_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Inflow, dec!(100), None).unwrap();

        assert!(!remove_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Inflow, dec!(99)).unwrap());
        // "100.00" still matches the stored "100"
        assert!(remove_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Inflow, dec!(100.00)).unwrap());
        assert!(list_cash_flows(&conn, "u").unwrap().is_empty());
    }

    #[test]
    fn test_delete_all_flows_scoped_to_unit() {
        let conn = test_conn();
        add_cash_flow(&conn, "u1", d("2025-08-21"), FlowType::Inflow, dec!(1), None).unwrap();
        add_cash_flow(&conn, "u1", d("2025-08-22"), FlowType::Outflow, dec!(2), None).unwrap();
        add_cash_flow(&conn, "u2", d("2025-08-22"), FlowType::Inflow, dec!(3), None).unwrap();

        assert_eq!(delete_all_cash_flows(&conn, "u1").unwrap(), 2);
        assert!(list_cash_flows(&conn, "u1").unwrap().is_empty());
        assert_eq!(list_cash_flows(&conn, "u2").unwrap().len(), 1);
    }

    #[test]
    fn test_add_flow_rejects_non_positive_amount() {
        let conn = test_conn();
        assert!(add_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Inflow, dec!(0), None).is_err());
        assert!(add_cash_flow(&conn, "u", d("2025-08-22"), FlowType::Outflow, dec!(-5), None).is_err());
    }

    #[test]
    fn test_cache_entry_round_trip_and_purge() {
        let conn = test_conn();
        let created = NaiveDate::from_ymd_opt(2025, 8, 22)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let entry = CacheEntry {
            cache_key: "abc".to_string(),
            unit_name: "u".to_string(),
            data_source: "live".to_string(),
            time_slot: "20250822-1000".to_string(),
            payload: "{\"x\":1}".to_string(),
            source_file_time: Some(created),
            created_at: created,
            expires_at: created + chrono::Duration::minutes(15),
        };
        upsert_cache_entry(&conn, &entry).unwrap();

        let loaded = get_cache_entry(&conn, "abc").unwrap().unwrap();
        assert_eq!(loaded.payload, entry.payload);
        assert_eq!(loaded.source_file_time, entry.source_file_time);

        // Nothing purged before the entry, everything after
        assert_eq!(purge_cache_created_before(&conn, created).unwrap(), 0);
        assert_eq!(
            purge_cache_created_before(&conn, created + chrono::Duration::days(1)).unwrap(),
            1
        );
        assert!(get_cache_entry(&conn, "abc").unwrap().is_none());
    }
}
