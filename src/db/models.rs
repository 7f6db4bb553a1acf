use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Direction of a manually entered capital movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FlowType {
    Inflow,
    Outflow,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Inflow => "inflow",
            FlowType::Outflow => "outflow",
        }
    }
}

impl FromStr for FlowType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inflow" => Ok(FlowType::Inflow),
            "outflow" => Ok(FlowType::Outflow),
            _ => Err(()),
        }
    }
}

/// One capital movement for a unit on a date. The ledger keeps at most
/// one row per (unit, date, direction); same-day entries in the same
/// direction are stored as a single replaced amount, not itemized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowEvent {
    pub id: Option<i64>,
    pub unit_name: String,
    pub flow_date: NaiveDate,
    pub flow_type: FlowType,
    pub amount: Decimal,
    pub note: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// Persisted memo of one computed payload per (unit, source, time slot)
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub cache_key: String,
    pub unit_name: String,
    pub data_source: String,
    pub time_slot: String,
    pub payload: String,
    /// Embedded timestamp of the freshest export file used for the
    /// computation; a newer file on disk invalidates the entry before
    /// its TTL runs out.
    pub source_file_time: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_type_round_trip() {
        assert_eq!(FlowType::from_str("inflow"), Ok(FlowType::Inflow));
        assert_eq!(FlowType::from_str("OUTFLOW"), Ok(FlowType::Outflow));
        assert_eq!(FlowType::from_str(" inflow "), Ok(FlowType::Inflow));
        assert!(FlowType::from_str("transfer").is_err());
        assert_eq!(FlowType::Inflow.as_str(), "inflow");
        assert_eq!(FlowType::Outflow.as_str(), "outflow");
    }
}
