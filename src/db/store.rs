use arrow::json::writer::{JsonArray, WriterBuilder};
use arrow::record_batch::RecordBatch;
use r2d2::Pool;
use std::time::Instant;
use tracing::{debug, info};

use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::{DataStore, Row, StoreError};

/// The procurement dataset, queried with generated SQL.
pub struct DuckDbStore {
    pool: Pool<DuckDBConnectionManager>,
}

impl DuckDbStore {
    pub fn new(pool: Pool<DuckDBConnectionManager>) -> Self {
        Self { pool }
    }

    /// Number of base tables, for the status endpoint.
    pub fn table_count(&self) -> Result<usize, StoreError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_type = 'BASE TABLE'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::QueryError(e.to_string()))?;
        Ok(count as usize)
    }
}

impl DataStore for DuckDbStore {
    fn execute(&self, query: &str, params: &[String]) -> Result<Vec<Row>, StoreError> {
        let start_time = Instant::now();

        // One checkout per call; the connection goes back to the pool when `conn` drops
        let conn = self
            .pool
            .get()
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let mut stmt = conn
            .prepare(query)
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        let record_batches: Vec<RecordBatch> = stmt
            .query_arrow(duckdb::params_from_iter(params.iter()))
            .map_err(|e| StoreError::QueryError(e.to_string()))?
            .collect();

        let rows = batches_to_rows(&record_batches)?;

        info!(
            "Query executed successfully. Row count: {}, Execution time: {}ms",
            rows.len(),
            start_time.elapsed().as_millis()
        );
        Ok(rows)
    }
}

// Encode Arrow batches as JSON objects, keeping nulls as explicit keys
fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, StoreError> {
    if batches.iter().all(|batch| batch.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());

    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| StoreError::ConversionError(e.to_string()))?;
    }
    writer
        .finish()
        .map_err(|e| StoreError::ConversionError(e.to_string()))?;

    let buffer = writer.into_inner();
    debug!("Encoded {} bytes of JSON rows", buffer.len());

    serde_json::from_slice(&buffer).map_err(|e| StoreError::ConversionError(e.to_string()))
}
