use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, OptionalExt};
use r2d2::{Pool, PooledConnection};
use tracing::{debug, info, warn};

use crate::chat::{
    default_session_name, ChatStore, Message, MessageId, MessageMetadata, PersistenceError, Role,
    Session, SessionId,
};
use crate::db::db_pool::DuckDBConnectionManager;

const INIT_SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS chat_session_ids START 1;
CREATE SEQUENCE IF NOT EXISTS chat_message_ids START 1;

CREATE TABLE IF NOT EXISTS chat_sessions (
    id BIGINT PRIMARY KEY DEFAULT nextval('chat_session_ids'),
    session_name VARCHAR NOT NULL,
    created_at VARCHAR NOT NULL,
    updated_at VARCHAR NOT NULL,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id BIGINT PRIMARY KEY DEFAULT nextval('chat_message_ids'),
    session_id BIGINT NOT NULL,
    role VARCHAR NOT NULL,
    content VARCHAR NOT NULL,
    metadata VARCHAR NOT NULL DEFAULT '{}',
    created_at VARCHAR NOT NULL
);
"#;

/// Chat history kept in its own DuckDB database.
pub struct DuckDbChatStore {
    pool: Pool<DuckDBConnectionManager>,
}

impl DuckDbChatStore {
    /// Wraps the pool and creates the chat tables if they are missing.
    pub fn open(pool: Pool<DuckDBConnectionManager>) -> Result<Self, PersistenceError> {
        let store = Self { pool };
        store
            .conn()?
            .execute_batch(INIT_SCHEMA)
            .map_err(storage)?;
        info!("Chat store schema ready");
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<DuckDBConnectionManager>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))
    }
}

fn storage(e: duckdb::Error) -> PersistenceError {
    PersistenceError::StorageError(e.to_string())
}

// Fixed-width UTC timestamps sort the same as text and as time
fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| PersistenceError::EncodingError(format!("bad timestamp '{}': {}", raw, e)))
}

type SessionRow = (i64, String, String, String);

fn session_from_row((id, name, created_at, updated_at): SessionRow) -> Result<Session, PersistenceError> {
    Ok(Session {
        id,
        name,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

impl ChatStore for DuckDbChatStore {
    fn create_session(&self, name: Option<&str>) -> Result<SessionId, PersistenceError> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => default_session_name(chrono::Local::now()),
        };
        let now = timestamp(Utc::now());

        let id: i64 = self
            .conn()?
            .query_row(
                "INSERT INTO chat_sessions (session_name, created_at, updated_at) VALUES (?, ?, ?) RETURNING id",
                params![name, now, now],
                |row| row.get(0),
            )
            .map_err(storage)?;

        info!("Created session {}: {}", id, name);
        Ok(id)
    }

    fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, PersistenceError> {
        let row: Option<SessionRow> = self
            .conn()?
            .query_row(
                "SELECT id, session_name, created_at, updated_at FROM chat_sessions WHERE id = ? AND NOT is_deleted",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(storage)?;

        row.map(session_from_row).transpose()
    }

    fn list_sessions(&self) -> Result<Vec<Session>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_name, created_at, updated_at FROM chat_sessions
                 WHERE NOT is_deleted ORDER BY updated_at DESC, id DESC",
            )
            .map_err(storage)?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .map_err(storage)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(session_from_row(row.map_err(storage)?)?);
        }
        Ok(sessions)
    }

    fn get_messages(&self, session_id: SessionId) -> Result<Vec<Message>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, role, content, metadata, created_at FROM chat_messages
                 WHERE session_id = ? ORDER BY id",
            )
            .map_err(storage)?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(storage)?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, role, content, metadata, created_at) = row.map_err(storage)?;
            let Some(role) = Role::parse(&role) else {
                warn!("Skipping message {} with unknown role '{}'", id, role);
                continue;
            };
            messages.push(Message {
                id,
                session_id,
                role,
                content,
                metadata: MessageMetadata::from_json_lossy(&metadata),
                created_at: parse_timestamp(&created_at)?,
            });
        }

        debug!("Loaded {} messages for session {}", messages.len(), session_id);
        Ok(messages)
    }

    fn append_message(
        &self,
        session_id: SessionId,
        role: Role,
        content: &str,
        metadata: Option<&MessageMetadata>,
    ) -> Result<MessageId, PersistenceError> {
        let metadata_json = match metadata {
            Some(metadata) => serde_json::to_string(metadata)
                .map_err(|e| PersistenceError::EncodingError(e.to_string()))?,
            None => "{}".to_string(),
        };
        let now = timestamp(Utc::now());

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        let message_id: i64 = tx
            .query_row(
                "INSERT INTO chat_messages (session_id, role, content, metadata, created_at)
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
                params![session_id, role.as_str(), content, metadata_json, now],
                |row| row.get(0),
            )
            .map_err(storage)?;

        let touched = tx
            .execute(
                "UPDATE chat_sessions SET updated_at = ? WHERE id = ? AND NOT is_deleted",
                params![now, session_id],
            )
            .map_err(storage)?;

        if touched == 0 {
            // Dropping the transaction rolls the insert back
            return Err(PersistenceError::StorageError(format!(
                "session {} does not exist or was deleted",
                session_id
            )));
        }

        tx.commit().map_err(storage)?;
        Ok(message_id)
    }

    fn rename_session(&self, session_id: SessionId, name: &str) -> Result<bool, PersistenceError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE chat_sessions SET session_name = ?, updated_at = ? WHERE id = ? AND NOT is_deleted",
                params![name, timestamp(Utc::now()), session_id],
            )
            .map_err(storage)?;

        if changed > 0 {
            info!("Renamed session {} to '{}'", session_id, name);
        }
        Ok(changed > 0)
    }

    fn soft_delete_session(&self, session_id: SessionId) -> Result<bool, PersistenceError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE chat_sessions SET is_deleted = TRUE, updated_at = ? WHERE id = ? AND NOT is_deleted",
                params![timestamp(Utc::now()), session_id],
            )
            .map_err(storage)?;

        if changed > 0 {
            info!("Deleted session {}", session_id);
        }
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::build_pool;
    use crate::llm::models::Confidence;

    fn store() -> DuckDbChatStore {
        DuckDbChatStore::open(build_pool(":memory:", 2).unwrap()).unwrap()
    }

    #[test]
    fn creates_named_and_default_sessions() {
        let store = store();
        let named = store.create_session(Some("Budget questions")).unwrap();
        let unnamed = store.create_session(None).unwrap();
        assert_ne!(named, unnamed);

        let session = store.get_session(named).unwrap().unwrap();
        assert_eq!(session.name, "Budget questions");
        assert!(store.get_session(unnamed).unwrap().unwrap().name.starts_with("Chat "));
    }

    #[test]
    fn messages_come_back_in_append_order_with_metadata() {
        let store = store();
        let id = store.create_session(Some("s")).unwrap();

        let metadata = MessageMetadata {
            query: Some("SELECT 1".to_string()),
            confidence: Some(Confidence::High),
            success: Some(true),
            row_count: Some(1),
            ..MessageMetadata::default()
        };
        store.append_message(id, Role::User, "first", None).unwrap();
        store
            .append_message(id, Role::Assistant, "second", Some(&metadata))
            .unwrap();

        let messages = store.get_messages(id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "first");
        assert!(messages[0].metadata.is_empty());
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].metadata, metadata);
    }

    #[test]
    fn append_bumps_session_to_top_of_list() {
        let store = store();
        let older = store.create_session(Some("older")).unwrap();
        let newer = store.create_session(Some("newer")).unwrap();

        store.append_message(older, Role::User, "hello", None).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions[0].id, older);
        assert_eq!(sessions[1].id, newer);
    }

    #[test]
    fn append_to_unknown_session_fails_without_writing() {
        let store = store();
        let result = store.append_message(999, Role::User, "lost", None);
        assert!(matches!(result, Err(PersistenceError::StorageError(_))));
        assert!(store.get_messages(999).unwrap().is_empty());
    }

    #[test]
    fn rename_and_soft_delete() {
        let store = store();
        let id = store.create_session(Some("draft")).unwrap();

        assert!(store.rename_session(id, "final").unwrap());
        assert_eq!(store.get_session(id).unwrap().unwrap().name, "final");

        assert!(store.soft_delete_session(id).unwrap());
        assert!(store.list_sessions().unwrap().is_empty());
        assert!(store.get_session(id).unwrap().is_none());

        // Deleted sessions can be neither renamed nor deleted again
        assert!(!store.rename_session(id, "again").unwrap());
        assert!(!store.soft_delete_session(id).unwrap());
        assert!(!store.rename_session(12345, "ghost").unwrap());

        // Nor do they take new messages
        let appended = store.append_message(id, Role::User, "too late", None);
        assert!(matches!(appended, Err(PersistenceError::StorageError(_))));
        assert!(store.get_messages(id).unwrap().is_empty());
    }
}
