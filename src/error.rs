//! Error handling for the reconciliation engine
//!
//! Defines custom error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use thiserror::Error;

/// Core error types for reconciliation operations
#[derive(Error, Debug)]
pub enum FundError {
    #[error("database error: {0}")]
    DbError(String),

    /// Missing directory or file. Not exceptional at the locator level
    /// (there it is an empty result); this variant is for callers that
    /// need data and found none.
    #[error("no data available: {0}")]
    NoData(String),

    /// A required canonical column could not be mapped to any header
    /// variant. Names both the column and the file so batch callers can
    /// skip the file and keep going.
    #[error("{file}: no header matches required column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for reconciliation operations
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = FundError::DbError("connection failed".to_string());
        assert_eq!(err.to_string(), "database error: connection failed");
    }

    #[test]
    fn test_missing_column_names_file_and_column() {
        let err = FundError::MissingColumn {
            file: "单元资产账户资产导出_20250822-150012.xlsx".to_string(),
            column: "total_asset".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("total_asset"));
        assert!(msg.contains("20250822-150012"));
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> =
            Err(anyhow::anyhow!("original error")).context("failed to load asset export");
        match result {
            Err(e) => {
                let msg = e.to_string();
                assert!(msg.contains("failed to load asset export"));
                let debug_msg = format!("{:?}", e);
                assert!(debug_msg.contains("original error") || msg.contains("original error"));
            }
            Ok(_) => panic!("expected error"),
        }
    }
}
