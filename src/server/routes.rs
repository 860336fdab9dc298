//! HTTP route handlers for the chat API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::chat::errors::ChatError;
use crate::chat::orchestrator::SendOutcome;
use crate::chat::types::{ChatSnapshot, ConversationId};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/conversations", post(create_conversation))
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route("/api/conversations/{id}/active", put(select_conversation))
        .route("/api/chat", post(chat_completion))
        .fallback_service(static_files)
        .with_state(state)
}

fn error_response(err: &ChatError) -> (StatusCode, String) {
    let status = match err {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gemini-chat",
        "model": state.model_name,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Current session snapshot.
async fn get_state(State(state): State<Arc<AppState>>) -> Json<ChatSnapshot> {
    Json(state.store.lock().await.snapshot())
}

/// Create a conversation and make it active.
async fn create_conversation(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ChatSnapshot>) {
    let mut store = state.store.lock().await;
    store.create_conversation().await;
    (StatusCode::CREATED, Json(store.snapshot()))
}

/// Make a conversation active.
async fn select_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
) -> Result<Json<ChatSnapshot>, (StatusCode, String)> {
    let mut store = state.store.lock().await;
    store
        .select_conversation(id)
        .map_err(|e| error_response(&e))?;
    Ok(Json(store.snapshot()))
}

/// Delete a conversation; unknown ids leave the state untouched.
async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
) -> Json<ChatSnapshot> {
    let mut store = state.store.lock().await;
    store.delete_conversation(id).await;
    Json(store.snapshot())
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Target conversation; defaults to the active one.
    pub conversation_id: Option<ConversationId>,
}

/// Chat response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Assistant text appended to the conversation.
    pub reply: String,
    /// Session state after the exchange.
    pub snapshot: ChatSnapshot,
}

/// Run one exchange through the orchestrator.
async fn chat_completion(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let outcome = match request.conversation_id {
        Some(id) => state.orchestrator.send(id, &request.message).await,
        None => state.orchestrator.send_active(&request.message).await,
    }
    .map_err(|e| error_response(&e))?;

    let reply = match outcome {
        SendOutcome::Replied(reply) => reply,
        SendOutcome::EmptyInput => {
            return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
        }
        SendOutcome::Busy => {
            return Err((
                StatusCode::CONFLICT,
                "a request is already in flight".to_string(),
            ));
        }
    };

    let snapshot = state.store.lock().await.snapshot();
    Ok(Json(ChatResponse { reply, snapshot }))
}
