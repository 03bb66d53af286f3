use crate::agent::SqlAgent;
use crate::chat::{ChatStore, PersistenceError};
use crate::config::AppConfig;
use crate::db::store::DuckDbStore;
use std::sync::Arc;
use tracing::error;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub agent: Arc<SqlAgent>,
    pub chat_store: Arc<dyn ChatStore>,
    pub data_store: Arc<DuckDbStore>,
    pub table_name: String,
    pub model_name: String,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        agent: Arc<SqlAgent>,
        chat_store: Arc<dyn ChatStore>,
        data_store: Arc<DuckDbStore>,
        table_name: String,
        model_name: String,
    ) -> Self {
        Self {
            config,
            agent,
            chat_store,
            data_store,
            table_name,
            model_name,
            startup_time: chrono::Utc::now(),
        }
    }

    /// Runs a chat store call on the blocking pool.
    pub async fn with_chat<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ChatStore) -> Result<T, PersistenceError> + Send + 'static,
    {
        let store = Arc::clone(&self.chat_store);
        match tokio::task::spawn_blocking(move || f(store.as_ref())).await {
            Ok(result) => result,
            Err(join_err) => {
                error!("Chat store task join error: {}", join_err);
                Err(PersistenceError::StorageError(format!(
                    "Chat store task failed: {}",
                    join_err
                )))
            }
        }
    }
}
