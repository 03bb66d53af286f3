use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::Mutex;

/// Hands out connections to a single DuckDB database instance.
///
/// Every pooled connection is a `try_clone` of one root connection, so all of
/// them share the same database (including `:memory:` databases) instead of
/// opening the file again.
pub struct DuckDBConnectionManager {
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: &str) -> Result<Self, duckdb::Error> {
        let root = if connection_string == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(connection_string)?
        };

        Ok(Self {
            root: Mutex::new(root),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        // A poisoned lock only means another clone panicked; the root is still usable
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Builds an r2d2 pool over a DuckDB database.
pub fn build_pool(
    connection_string: &str,
    pool_size: usize,
) -> Result<r2d2::Pool<DuckDBConnectionManager>, Box<dyn std::error::Error + Send + Sync>> {
    let manager = DuckDBConnectionManager::new(connection_string)?;
    let pool = r2d2::Pool::builder()
        .max_size(pool_size.max(1) as u32)
        .build(manager)?;
    Ok(pool)
}
