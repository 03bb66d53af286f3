use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{DataStore, Row};

/// Outcome of running one generated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub rows: Vec<Row>,
    pub error_message: Option<String>,
    pub attempt_count: u32,
}

/// Runs a query against the data store, repeating it on failure.
///
/// Every failure is retried the same way and the query text never changes
/// between attempts, so this only helps against transient store errors.
pub struct RetryExecutor {
    store: Arc<dyn DataStore>,
    max_attempts: u32,
}

impl RetryExecutor {
    pub fn new(store: Arc<dyn DataStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn execute(&self, query: &str) -> ExecutionResult {
        self.execute_with_retry(query, self.max_attempts)
    }

    pub fn execute_with_retry(&self, query: &str, max_attempts: u32) -> ExecutionResult {
        // attempt_count is at least 1 even for a zero bound
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < max_attempts {
            attempt += 1;
            match self.store.execute(query, &[]) {
                Ok(rows) => {
                    if attempt > 1 {
                        info!("Query succeeded on attempt {}", attempt);
                    }
                    return ExecutionResult {
                        success: true,
                        rows,
                        error_message: None,
                        attempt_count: attempt,
                    };
                }
                Err(e) => {
                    warn!("Query failed (attempt {}/{}): {}", attempt, max_attempts, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        ExecutionResult {
            success: false,
            rows: Vec::new(),
            error_message: last_error,
            attempt_count: max_attempts,
        }
    }
}
