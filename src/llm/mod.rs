pub mod models;
pub mod providers;

use crate::config::LlmConfig;
use crate::llm::models::{parse_generated_response, GeneratedResponse, OUTPUT_CONTRACT};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
    MalformedOutput(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::MalformedOutput(msg) => write!(f, "LLM output error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// A chat-style text completion endpoint.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, instructions: &str, prompt: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Structured generation on top of a [`ModelBackend`].
///
/// The manager owns the output contract: it appends the JSON shape to the
/// instructions and re-asks the backend when the reply does not parse, up to
/// `output_retries` extra times.
pub struct LlmManager {
    backend: Box<dyn ModelBackend>,
    output_retries: u32,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend: Box<dyn ModelBackend> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self::with_backend(backend, config.output_retries))
    }

    pub fn with_backend(backend: Box<dyn ModelBackend>, output_retries: u32) -> Self {
        Self {
            backend,
            output_retries,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub async fn generate_structured(
        &self,
        prompt: &str,
        instructions: &str,
    ) -> Result<GeneratedResponse, LlmError> {
        let instructions = format!("{}\n{}", instructions, OUTPUT_CONTRACT);
        let mut current_prompt = prompt.to_string();
        let mut attempt = 0;

        loop {
            let content = self.backend.complete(&instructions, &current_prompt).await?;
            debug!("Model output (attempt {}): {}", attempt + 1, content);

            match parse_generated_response(&content) {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.output_retries => {
                    attempt += 1;
                    warn!("Model output rejected, asking again ({}/{}): {}", attempt, self.output_retries, e);
                    current_prompt = format!(
                        "{}\n\nYour previous reply could not be used ({}). Reply with only the JSON object described in the instructions.",
                        prompt, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays canned replies in order and records every prompt it sees.
    pub struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub prompts: Arc<Mutex<Vec<String>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn replying(reply: &str) -> Self {
            Self::new(vec![Ok(reply.to_string())])
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn complete(&self, _instructions: &str, prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::ResponseError("script exhausted".to_string())))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}
