pub mod db_pool;
pub mod store;

use std::error::Error;
use std::fmt;

/// One result record, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    ConnectionError(String),
    QueryError(String),
    ConversionError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConnectionError(msg) => write!(f, "Database connection error: {}", msg),
            StoreError::QueryError(msg) => write!(f, "Query error: {}", msg),
            StoreError::ConversionError(msg) => write!(f, "Result conversion error: {}", msg),
        }
    }
}

impl Error for StoreError {}

/// Executes query text in the store's native language (SQL for DuckDB).
///
/// Blocking: callers on the async runtime go through `spawn_blocking`.
pub trait DataStore: Send + Sync {
    fn execute(&self, query: &str, params: &[String]) -> Result<Vec<Row>, StoreError>;
}
