pub mod duckdb_store;
pub mod reply;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

use crate::db::Row;
use crate::llm::models::Confidence;

pub type SessionId = i64;
pub type MessageId = i64;

#[derive(Debug)]
pub enum PersistenceError {
    ConnectionError(String),
    StorageError(String),
    EncodingError(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::ConnectionError(msg) => write!(f, "Chat store connection error: {}", msg),
            PersistenceError::StorageError(msg) => write!(f, "Chat store error: {}", msg),
            PersistenceError::EncodingError(msg) => write!(f, "Chat record encoding error: {}", msg),
        }
    }
}

impl Error for PersistenceError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// What the agent records alongside an assistant reply.
///
/// Every field is optional and unknown fields are ignored, so records written
/// by older versions still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, alias = "sql_query", skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
}

impl MessageMetadata {
    /// Lenient decode: anything that is not a well-formed metadata object
    /// becomes the empty record.
    pub fn from_json_lossy(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        *self == MessageMetadata::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
}

/// Session and message history, an append-only log per session.
pub trait ChatStore: Send + Sync {
    fn create_session(&self, name: Option<&str>) -> Result<SessionId, PersistenceError>;

    /// `None` for unknown or soft-deleted sessions.
    fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, PersistenceError>;

    /// Sessions that are not soft-deleted, most recently updated first.
    fn list_sessions(&self) -> Result<Vec<Session>, PersistenceError>;

    /// Messages in the order they were appended.
    fn get_messages(&self, session_id: SessionId) -> Result<Vec<Message>, PersistenceError>;

    fn append_message(
        &self,
        session_id: SessionId,
        role: Role,
        content: &str,
        metadata: Option<&MessageMetadata>,
    ) -> Result<MessageId, PersistenceError>;

    fn rename_session(&self, session_id: SessionId, name: &str) -> Result<bool, PersistenceError>;

    fn soft_delete_session(&self, session_id: SessionId) -> Result<bool, PersistenceError>;
}

/// Name given to sessions created without one.
pub fn default_session_name(now: DateTime<chrono::Local>) -> String {
    format!("Chat {}", now.format("%Y-%m-%d %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_tolerates_unknown_fields() {
        let metadata = MessageMetadata::from_json_lossy(
            r#"{"query": "SELECT 1", "confidence": "high", "success": true, "theme": "dark"}"#,
        );
        assert_eq!(metadata.query.as_deref(), Some("SELECT 1"));
        assert_eq!(metadata.confidence, Some(Confidence::High));
        assert_eq!(metadata.success, Some(true));
    }

    #[test]
    fn malformed_metadata_decodes_empty() {
        assert!(MessageMetadata::from_json_lossy("not json").is_empty());
        assert!(MessageMetadata::from_json_lossy("[1, 2, 3]").is_empty());
        assert!(MessageMetadata::from_json_lossy(r#""a string""#).is_empty());
        assert!(MessageMetadata::from_json_lossy(r#"{"query": 42}"#).is_empty());
    }

    #[test]
    fn empty_metadata_serializes_to_empty_object() {
        let json = serde_json::to_string(&MessageMetadata::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
