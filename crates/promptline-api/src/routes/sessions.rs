use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use promptline_llm::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role().to_string(),
            content: message.content().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Committed messages, oldest first
    pub messages: Vec<MessageView>,
    pub history_limit: usize,
    /// True while a reply is being streamed
    pub busy: bool,
}

/// Start a new conversation
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created", body = SessionCreated)
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<SessionCreated>)> {
    let (session_id, entry) = state.create_session().await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id,
            created_at: entry.created_at,
        }),
    ))
}

/// Committed history of a session
///
/// While a reply is streaming the history cannot be read consistently, so the
/// messages list is empty and `busy` is set.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session history", body = SessionResponse),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionResponse>> {
    let entry = state
        .session(&session_id)
        .await
        .ok_or(ApiError::SessionNotFound(session_id))?;

    let (messages, busy) = match entry.chat.try_lock() {
        Ok(chat) => (chat.history().iter().map(MessageView::from).collect(), false),
        Err(_) => (Vec::new(), true),
    };

    Ok(Json(SessionResponse {
        session_id,
        created_at: entry.created_at,
        messages,
        history_limit: state.config.chat.history_limit,
        busy,
    }))
}

/// Forget a session
#[utoipa::path(
    delete,
    path = "/sessions/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "Session id")
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.remove_session(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(session_id))
    }
}

/// Clear the conversation history, keeping the session
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/clear",
    params(
        ("session_id" = Uuid, Path, description = "Session id")
    ),
    responses(
        (status = 204, description = "History cleared"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "A reply is still streaming")
    ),
    tag = "sessions"
)]
pub async fn clear_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let entry = state
        .session(&session_id)
        .await
        .ok_or(ApiError::SessionNotFound(session_id))?;

    let mut chat = entry
        .chat
        .try_lock()
        .map_err(|_| ApiError::TurnInProgress(session_id))?;
    chat.reset();
    tracing::info!(session_id = %session_id, "Session history cleared");

    Ok(StatusCode::NO_CONTENT)
}
