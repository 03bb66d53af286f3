use std::sync::Arc;
use tracing::{debug, error, info};

use crate::agent::context::ConversationTurn;
use crate::llm::models::{Confidence, GeneratedResponse};
use crate::llm::LlmManager;

/// Turns at most this many recent turns into prompt context.
const PROMPT_CONTEXT_TURNS: usize = 3;

/// True when the generated query means "answer without touching the data".
pub fn is_no_query(query: Option<&str>) -> bool {
    match query.map(str::trim) {
        None => true,
        Some(q) => q.is_empty() || q.eq_ignore_ascii_case("none"),
    }
}

/// Prefixes the question with the most recent turns so follow-ups resolve.
pub fn contextual_prompt(question: &str, history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return question.to_string();
    }

    let recent = &history[history.len().saturating_sub(PROMPT_CONTEXT_TURNS)..];
    let mut prompt = String::from("Previous context:\n");
    for turn in recent {
        prompt.push_str(&format!("Q: {}\n", turn.question));
        if !turn.query.trim().is_empty() {
            prompt.push_str(&format!("Query: {}\n", turn.query));
        }
    }
    prompt.push_str(&format!("\nCurrent question: {}", question));
    prompt
}

pub struct QueryGenerator {
    llm: Arc<LlmManager>,
    instructions: String,
}

impl QueryGenerator {
    pub fn new(llm: Arc<LlmManager>, instructions: String) -> Self {
        Self { llm, instructions }
    }

    /// Asks the model for a query-or-chat decision. Model failures come back
    /// as a low-confidence chat answer carrying the error text.
    pub async fn generate(&self, question: &str, history: &[ConversationTurn]) -> GeneratedResponse {
        let prompt = contextual_prompt(question, history);
        debug!("Generation prompt: {}", prompt);

        match self.llm.generate_structured(&prompt, &self.instructions).await {
            Ok(response) => {
                info!(
                    "Generated {} response (confidence: {})",
                    if is_no_query(response.query.as_deref()) { "chat" } else { "query" },
                    response.confidence
                );
                response
            }
            Err(e) => {
                error!("Error generating SQL: {}", e);
                GeneratedResponse::chat_only(format!("Error: {}", e), Confidence::Low)
            }
        }
    }
}
