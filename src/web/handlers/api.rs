use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::agent::context::build_context;
use crate::agent::QuestionOutcome;
use crate::chat::reply::{compose_reply, reply_metadata, ChatExport};
use crate::chat::{Message, MessageId, PersistenceError, Role, Session, SessionId};
use crate::web::state::AppState;

type ApiError = (StatusCode, String);

// Session types

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

// Question types

#[derive(Debug, Deserialize, Clone)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub message_id: MessageId,
    pub reply: String,
    pub outcome: QuestionOutcome,
    pub elapsed_ms: u64,
}

// System status

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub table_name: String,
    pub table_count: Option<usize>,
    pub model: String,
    pub session_count: usize,
}

fn persistence_error(e: PersistenceError) -> ApiError {
    error!("Chat store failure: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn session_not_found(session_id: SessionId) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Session {} not found", session_id))
}

async fn require_session(state: &AppState, session_id: SessionId) -> Result<Session, ApiError> {
    state
        .with_chat(move |store| store.get_session(session_id))
        .await
        .map_err(persistence_error)?
        .ok_or_else(|| session_not_found(session_id))
}

// Sessions
pub async fn list_sessions(state: State<Arc<AppState>>) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = state
        .with_chat(|store| store.list_sessions())
        .await
        .map_err(persistence_error)?;
    Ok(Json(sessions))
}

pub async fn create_session(
    state: State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    // The body is optional; an empty request creates a session with a default name
    let request: CreateSessionRequest = if body.is_empty() {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)))?
    };
    let name = request.name;
    let id = state
        .with_chat(move |store| store.create_session(name.as_deref()))
        .await
        .map_err(persistence_error)?;
    Ok((StatusCode::CREATED, Json(CreatedSession { id })))
}

pub async fn rename_session(
    state: State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(payload): Json<RenameSessionRequest>,
) -> Result<StatusCode, ApiError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Session name must not be empty".to_string()));
    }

    let renamed = state
        .with_chat(move |store| store.rename_session(session_id, &name))
        .await
        .map_err(persistence_error)?;

    if renamed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(session_id))
    }
}

pub async fn delete_session(
    state: State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .with_chat(move |store| store.soft_delete_session(session_id))
        .await
        .map_err(persistence_error)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(session_id))
    }
}

pub async fn list_messages(
    state: State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Vec<Message>>, ApiError> {
    require_session(&state, session_id).await?;
    let messages = state
        .with_chat(move |store| store.get_messages(session_id))
        .await
        .map_err(persistence_error)?;
    Ok(Json(messages))
}

pub async fn export_session(
    state: State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<ChatExport>, ApiError> {
    let session = require_session(&state, session_id).await?;
    let messages = state
        .with_chat(move |store| store.get_messages(session_id))
        .await
        .map_err(persistence_error)?;
    Ok(Json(ChatExport::new(session.id, session.name, messages)))
}

// Ask a question inside a session
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let start_time = Instant::now();
    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    require_session(&state, session_id).await?;
    info!("Question for session {}: {}", session_id, question);

    let user_question = question.clone();
    let messages = state
        .with_chat(move |store| {
            store.append_message(session_id, Role::User, &user_question, None)?;
            store.get_messages(session_id)
        })
        .await
        .map_err(persistence_error)?;

    let history = build_context(&messages, state.config.agent.context_turns);

    let outcome = match state.config.agent.request_timeout_secs {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs(secs), state.agent.process_question(&question, &history)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Question timed out after {}s", secs);
                    QuestionOutcome::failed(format!("The request timed out after {} seconds.", secs))
                }
            }
        }
        None => state.agent.process_question(&question, &history).await,
    };

    let reply = compose_reply(&outcome);
    let metadata = reply_metadata(&outcome);
    let content = reply.clone();
    let message_id = state
        .with_chat(move |store| store.append_message(session_id, Role::Assistant, &content, Some(&metadata)))
        .await
        .map_err(persistence_error)?;

    let elapsed_ms = start_time.elapsed().as_millis() as u64;
    info!(
        "Answered question in session {} (success: {}, {}ms)",
        session_id, outcome.success, elapsed_ms
    );

    Ok(Json(AskResponse {
        message_id,
        reply,
        outcome,
        elapsed_ms,
    }))
}

// System status
pub async fn system_status(state: State<Arc<AppState>>) -> Result<Json<SystemStatus>, ApiError> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let session_count = state
        .with_chat(|store| store.list_sessions())
        .await
        .map_err(persistence_error)?
        .len();

    let data_store = Arc::clone(&state.data_store);
    let table_count = match tokio::task::spawn_blocking(move || data_store.table_count()).await {
        Ok(Ok(count)) => Some(count),
        Ok(Err(e)) => {
            error!("Failed to get table count: {}", e);
            None
        }
        Err(e) => {
            error!("Task join error: {}", e);
            None
        }
    };

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        table_name: state.table_name.clone(),
        table_count,
        model: state.model_name.clone(),
        session_count,
    }))
}
