use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use niro_core::model::{ChatRequest, ChatResponse};
use niro_core::orchestrator::SessionSummary;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route(
            "/chat/session/{id}",
            get(session_summary).delete(delete_session),
        )
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let sessions = state.orchestrator.session_count().await?;
    Ok(Json(json!({ "status": "ok", "sessions": sessions })))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = state.orchestrator.process_message(request).await?;
    Ok(Json(response))
}

async fn session_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let summary = state
        .orchestrator
        .session_summary(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no session {id}")))?;
    Ok(Json(summary))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.orchestrator.delete_session(&id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
