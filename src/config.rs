use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::agent::context::DEFAULT_CONTEXT_TURNS;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,   // Model name
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    /// Extra attempts the model integration gets when its output does not parse
    pub output_retries: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub schema_path: String,
    pub prompt_path: String,
    pub max_query_retries: u32,
    pub context_turns: usize,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The procurement dataset queried by generated SQL
    pub database: DatabaseConfig,
    /// Session and message history
    pub chat: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// YAML file describing the queried table
    #[arg(long, value_name = "FILE")]
    pub schema: Option<String>,

    /// System prompt template
    #[arg(long, value_name = "FILE")]
    pub prompt: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        // Start with default configuration
        let mut config_builder = Config::builder()
            .set_default("database.connection_string", defaults.database.connection_string)?
            .set_default("database.pool_size", defaults.database.pool_size as i64)?
            .set_default("chat.connection_string", defaults.chat.connection_string)?
            .set_default("chat.pool_size", defaults.chat.pool_size as i64)?
            .set_default("web.host", defaults.web.host)?
            .set_default("web.port", defaults.web.port as i64)?
            .set_default("llm.backend", defaults.llm.backend)?
            .set_default("llm.model", defaults.llm.model)?
            .set_default("llm.output_retries", defaults.llm.output_retries as i64)?
            .set_default("llm.temperature", defaults.llm.temperature as f64)?
            .set_default("agent.schema_path", defaults.agent.schema_path)?
            .set_default("agent.prompt_path", defaults.agent.prompt_path)?
            .set_default("agent.max_query_retries", defaults.agent.max_query_retries as i64)?
            .set_default("agent.context_turns", defaults.agent.context_turns as i64)?
            .set_default("logging.json", defaults.logging.json)?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/penny/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // PENNY_LLM__API_KEY, PENNY_AGENT__MAX_QUERY_RETRIES, ...
        config_builder = config_builder.add_source(
            Environment::with_prefix("PENNY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Build the config
        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(schema) = &args.schema {
            config.agent.schema_path = schema.clone();
        }
        if let Some(prompt) = &args.prompt {
            config.agent.prompt_path = prompt.clone();
        }

        Ok(config)
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "penny.duckdb".to_string(),
                pool_size: 5,
            },
            chat: DatabaseConfig {
                connection_string: "penny_chat.duckdb".to_string(),
                pool_size: 2,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "remote".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                api_url: None,
                output_retries: 2,
                temperature: 0.1,
            },
            agent: AgentConfig {
                schema_path: "schema/table_schema.yaml".to_string(),
                prompt_path: "prompts/system_prompt.txt".to_string(),
                max_query_retries: 3,
                context_turns: DEFAULT_CONTEXT_TURNS,
                request_timeout_secs: None,
            },
            logging: LoggingConfig { json: false },
        }
    }
}
