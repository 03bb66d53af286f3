pub mod context;
pub mod executor;
pub mod generator;
pub mod prompt;
pub mod schema;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::agent::context::ConversationTurn;
use crate::agent::executor::{ExecutionResult, RetryExecutor};
use crate::agent::generator::{is_no_query, QueryGenerator};
use crate::db::Row;
use crate::llm::models::Confidence;

/// End-to-end answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionOutcome {
    pub success: bool,
    pub query: Option<String>,
    pub explanation: String,
    pub confidence: Confidence,
    pub rows: Option<Vec<Row>>,
    pub error_message: Option<String>,
    /// Execution attempts; `None` when nothing was executed
    pub attempts: Option<u32>,
}

impl QuestionOutcome {
    /// A failure that happened outside generation and execution.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            query: None,
            explanation: message.clone(),
            confidence: Confidence::Low,
            rows: None,
            error_message: Some(message),
            attempts: None,
        }
    }
}

/// Sequences generation, optional execution and result assembly.
pub struct SqlAgent {
    generator: QueryGenerator,
    executor: Arc<RetryExecutor>,
}

impl SqlAgent {
    pub fn new(generator: QueryGenerator, executor: RetryExecutor) -> Self {
        Self {
            generator,
            executor: Arc::new(executor),
        }
    }

    pub async fn process_question(&self, question: &str, history: &[ConversationTurn]) -> QuestionOutcome {
        let generated = self.generator.generate(question, history).await;

        let query = match generated.query {
            Some(query) if !is_no_query(Some(&query)) => query,
            _ => {
                debug!("No query needed, answering conversationally");
                return QuestionOutcome {
                    success: true,
                    query: None,
                    explanation: generated.explanation,
                    confidence: generated.confidence,
                    rows: None,
                    error_message: None,
                    attempts: None,
                };
            }
        };

        info!("Executing generated query: {}", query);

        // DuckDB calls block, keep them off the async workers
        let executor = Arc::clone(&self.executor);
        let to_run = query.clone();
        let execution = match tokio::task::spawn_blocking(move || executor.execute(&to_run)).await {
            Ok(result) => result,
            Err(join_err) => {
                error!("Task join error: {}", join_err);
                ExecutionResult {
                    success: false,
                    rows: Vec::new(),
                    error_message: Some(format!("Database task execution failed: {}", join_err)),
                    attempt_count: 1,
                }
            }
        };

        QuestionOutcome {
            success: execution.success,
            query: Some(query),
            explanation: generated.explanation,
            confidence: generated.confidence,
            rows: execution.success.then_some(execution.rows),
            error_message: execution.error_message,
            attempts: Some(execution.attempt_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::executor::testing::{row, FlakyStore};
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::LlmManager;

    fn agent(reply: &str, store: Arc<FlakyStore>) -> SqlAgent {
        let llm = Arc::new(LlmManager::with_backend(Box::new(ScriptedBackend::replying(reply)), 2));
        SqlAgent::new(
            QueryGenerator::new(llm, "rules".to_string()),
            RetryExecutor::new(store, 3),
        )
    }

    #[test]
    fn failed_outcome_is_low_confidence_without_query_or_rows() {
        let outcome = QuestionOutcome::failed("timed out");

        assert!(!outcome.success);
        assert!(outcome.query.is_none());
        assert!(outcome.rows.is_none());
        assert!(outcome.attempts.is_none());
        assert_eq!(outcome.confidence, Confidence::Low);
        assert_eq!(outcome.explanation, "timed out");
        assert_eq!(outcome.error_message.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn chat_only_answer_never_touches_the_store() {
        let store = Arc::new(FlakyStore::failing_first(0, Vec::new()));
        let agent = agent(
            r#"{"query": null, "explanation": "Hi! Ask me about purchases.", "confidence": "high"}"#,
            store.clone(),
        );

        let outcome = agent.process_question("hello", &[]).await;

        assert!(outcome.success);
        assert!(outcome.query.is_none());
        assert!(outcome.rows.is_none());
        assert_eq!(outcome.explanation, "Hi! Ask me about purchases.");
        assert_eq!(outcome.confidence, Confidence::High);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn placeholder_queries_are_treated_as_chat() {
        for query in ["\"\"", "\"   \"", "\"None\"", "\"none\""] {
            let store = Arc::new(FlakyStore::failing_first(0, Vec::new()));
            let reply = format!(r#"{{"query": {}, "explanation": "chat", "confidence": "medium"}}"#, query);
            let agent = agent(&reply, store.clone());

            let outcome = agent.process_question("thanks", &[]).await;

            assert!(outcome.success, "query {} should be chat", query);
            assert!(outcome.query.is_none());
            assert_eq!(store.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn executes_generated_query() {
        let store = Arc::new(FlakyStore::failing_first(1, vec![row("total", serde_json::json!(99.5))]));
        let agent = agent(
            r#"{"query": "SELECT SUM(total_price) AS total FROM purchases", "explanation": "Sums spend", "confidence": "high"}"#,
            store.clone(),
        );

        let outcome = agent.process_question("total spend?", &[]).await;

        assert!(outcome.success);
        assert_eq!(outcome.query.as_deref(), Some("SELECT SUM(total_price) AS total FROM purchases"));
        assert_eq!(outcome.rows, Some(vec![row("total", serde_json::json!(99.5))]));
        assert_eq!(outcome.attempts, Some(2));
        assert!(outcome.error_message.is_none());
    }

    #[tokio::test]
    async fn execution_failure_keeps_generator_explanation_and_confidence() {
        let store = Arc::new(FlakyStore::always_failing());
        let agent = agent(
            r#"{"query": "SELECT 1", "explanation": "Confident answer", "confidence": "high"}"#,
            store.clone(),
        );

        let outcome = agent.process_question("q", &[]).await;

        assert!(!outcome.success);
        assert_eq!(outcome.explanation, "Confident answer");
        assert_eq!(outcome.confidence, Confidence::High);
        assert_eq!(outcome.query.as_deref(), Some("SELECT 1"));
        assert!(outcome.rows.is_none());
        assert_eq!(outcome.attempts, Some(3));
        assert_eq!(outcome.error_message.as_deref(), Some("Database connection error: blip #3"));
        assert_eq!(store.call_count(), 3);
    }
}
