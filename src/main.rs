use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod agent;
mod chat;
mod config;
mod db;
mod llm;
mod util;
mod web;

use crate::agent::executor::RetryExecutor;
use crate::agent::generator::QueryGenerator;
use crate::agent::schema::SchemaDescription;
use crate::agent::{prompt, SqlAgent};
use crate::chat::duckdb_store::DuckDbChatStore;
use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::build_pool;
use crate::db::store::DuckDbStore;
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize logging
    init_tracing(config.logging.json);

    info!("Opening dataset at {}", config.database.connection_string);
    let data_pool = build_pool(&config.database.connection_string, config.database.pool_size)?;
    let data_store = Arc::new(DuckDbStore::new(data_pool));

    info!("Opening chat history at {}", config.chat.connection_string);
    let chat_pool = build_pool(&config.chat.connection_string, config.chat.pool_size)?;
    let chat_store = Arc::new(DuckDbChatStore::open(chat_pool)?);

    // Build the system instruction once; it is reused for every question
    let schema = SchemaDescription::load(&config.agent.schema_path);
    if schema.is_empty() {
        warn!("No table description available; the model will work without column details");
    }
    let instructions = prompt::build_from_file(&config.agent.prompt_path, &schema);
    let table_name = prompt::table_name(&schema).to_string();

    info!("Initializing LLM backend: {}", config.llm.backend);
    let llm_manager = Arc::new(LlmManager::new(&config.llm)?);
    let model_name = llm_manager.model_name().to_string();

    let generator = QueryGenerator::new(llm_manager, instructions);
    let executor = RetryExecutor::new(data_store.clone(), config.agent.max_query_retries);
    info!(
        "Agent ready (table: {}, model: {}, max attempts: {})",
        table_name,
        model_name,
        executor.max_attempts()
    );
    let agent = Arc::new(SqlAgent::new(generator, executor));

    let web_config = config.web.clone();
    let app_state = Arc::new(AppState::new(
        config,
        agent,
        chat_store,
        data_store,
        table_name,
        model_name,
    ));

    if let Err(e) = web::run_server(web_config, app_state).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
