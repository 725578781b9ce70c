//! Chat HTTP handler.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::debug;

use crate::llm::{ChatRequest as LlmRequest, Message};
use crate::response::{ApiError, ApiJson};
use crate::schemas::{ChatRequest, ChatResponse, Validate};
use crate::server::AppState;

/// POST /api/v1/chat
pub async fn chat(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    req.validate()?;

    let client = state
        .clients
        .chat_client()
        .map_err(ApiError::client_unavailable)?;

    let messages = vec![
        Message::system(format!("Respond in {}.", req.language.name())),
        Message::user(req.message),
    ];

    let response = client
        .chat(LlmRequest::new(messages))
        .await
        .map_err(ApiError::provider)?;

    debug!(usage = ?response.usage, "Chat completed");

    Ok(Json(ChatResponse {
        response: response.content,
        language: req.language,
        timestamp: Utc::now(),
    }))
}
