use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent::QuestionOutcome;
use crate::chat::{Message, MessageMetadata, SessionId};

/// Text stored as the assistant message for an outcome.
pub fn compose_reply(outcome: &QuestionOutcome) -> String {
    if !outcome.success {
        let error = outcome
            .error_message
            .as_deref()
            .unwrap_or("An unexpected error occurred.");
        return format!("**Unable to process your request**\n\n{}", error);
    }

    if outcome.query.is_none() {
        return outcome.explanation.clone();
    }

    let rows = outcome.rows.as_ref().map_or(0, Vec::len);
    let mut footer = vec![format!("*Retrieved {} rows*", rows)];
    if let Some(attempts) = outcome.attempts.filter(|a| *a > 1) {
        footer.push(format!("*{} attempts*", attempts));
    }

    format!("{}\n\n{}", outcome.explanation, footer.join(" • "))
}

/// Metadata persisted next to the assistant reply.
pub fn reply_metadata(outcome: &QuestionOutcome) -> MessageMetadata {
    MessageMetadata {
        query: outcome.query.clone(),
        confidence: Some(outcome.confidence),
        success: Some(outcome.success),
        row_count: outcome.rows.as_ref().map(Vec::len),
        attempts: outcome.attempts,
        rows: outcome.rows.clone(),
    }
}

#[derive(Debug, Serialize)]
pub struct ChatExport {
    pub session_id: SessionId,
    pub session_name: String,
    pub exported_at: DateTime<Utc>,
    pub message_count: usize,
    pub messages: Vec<Message>,
}

impl ChatExport {
    pub fn new(session_id: SessionId, session_name: String, messages: Vec<Message>) -> Self {
        Self {
            session_id,
            session_name,
            exported_at: Utc::now(),
            message_count: messages.len(),
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::executor::testing::row;
    use crate::llm::models::Confidence;

    fn outcome() -> QuestionOutcome {
        QuestionOutcome {
            success: true,
            query: Some("SELECT 1".to_string()),
            explanation: "Spend by department.".to_string(),
            confidence: Confidence::High,
            rows: Some(vec![row("a", serde_json::json!(1)), row("a", serde_json::json!(2))]),
            error_message: None,
            attempts: Some(1),
        }
    }

    #[test]
    fn query_reply_has_row_footer() {
        assert_eq!(compose_reply(&outcome()), "Spend by department.\n\n*Retrieved 2 rows*");

        let mut retried = outcome();
        retried.attempts = Some(3);
        assert_eq!(
            compose_reply(&retried),
            "Spend by department.\n\n*Retrieved 2 rows* • *3 attempts*"
        );
    }

    #[test]
    fn chat_reply_is_the_explanation() {
        let mut chat = outcome();
        chat.query = None;
        chat.rows = None;
        chat.attempts = None;
        assert_eq!(compose_reply(&chat), "Spend by department.");
    }

    #[test]
    fn failed_reply_shows_error() {
        let mut failed = outcome();
        failed.success = false;
        failed.rows = None;
        failed.error_message = Some("Query error: no such column".to_string());
        assert_eq!(
            compose_reply(&failed),
            "**Unable to process your request**\n\nQuery error: no such column"
        );
    }

    #[test]
    fn metadata_carries_summary_fields() {
        let metadata = reply_metadata(&outcome());
        assert_eq!(metadata.query.as_deref(), Some("SELECT 1"));
        assert_eq!(metadata.confidence, Some(Confidence::High));
        assert_eq!(metadata.success, Some(true));
        assert_eq!(metadata.row_count, Some(2));
        assert_eq!(metadata.rows.as_ref().map(Vec::len), Some(2));
    }
}
