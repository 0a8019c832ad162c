use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use promptline_llm::BufferError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("A reply is still being streamed for session {0}")]
    TurnInProgress(Uuid),

    #[error("Conversation state error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::TurnInProgress(_) | ApiError::Buffer(BufferError::ReplyInFlight) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::Buffer(ref e) => {
                tracing::error!("Buffer protocol error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
