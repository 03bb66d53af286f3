use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - JSON API consumed by the chat front end
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Chat sessions
            .route(
                "/sessions",
                get(handlers::api::list_sessions).post(handlers::api::create_session),
            )
            .route(
                "/sessions/{id}",
                axum::routing::put(handlers::api::rename_session)
                    .delete(handlers::api::delete_session),
            )
            .route("/sessions/{id}/messages", get(handlers::api::list_messages))
            .route("/sessions/{id}/export", get(handlers::api::export_session))
            // Question answering
            .route("/sessions/{id}/ask", post(handlers::api::ask))
            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
