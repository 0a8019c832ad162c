use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use promptline_chain::TurnOutcome;
use serde::Deserialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Events of one streamed turn, in the order they are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A new fragment and the reply accumulated so far
    Delta { fragment: String, partial: String },
    /// The reply was committed to the history
    Done { reply: String },
    /// Blank input; nothing was sent to the model
    Skipped,
    /// The model call failed; the user message stays in the history
    Error { error: String },
}

impl TurnEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::Done { .. } => "done",
            Self::Skipped => "skipped",
            Self::Error { .. } => "error",
        }
    }

    fn into_sse(self) -> Result<Event, axum::Error> {
        let data = match &self {
            Self::Delta { fragment, partial } => {
                serde_json::json!({ "fragment": fragment, "partial": partial })
            }
            Self::Done { reply } => serde_json::json!({ "reply": reply }),
            Self::Skipped => serde_json::json!({}),
            Self::Error { error } => serde_json::json!({ "error": error }),
        };
        Event::default().event(self.name()).json_data(data)
    }
}

/// Send a message and stream the reply using Server-Sent Events
///
/// Events: `delta {fragment, partial}` per fragment, then exactly one of
/// `done {reply}`, `skipped` or `error {error}`. Closing the connection
/// cancels the turn and discards the partial reply.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/messages",
    params(
        ("session_id" = Uuid, Path, description = "Session id")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Streaming response", content_type = "text/event-stream"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "A reply is already streaming for this session")
    ),
    tag = "messages"
)]
pub async fn send_message_stream(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    // 1. Find the session
    let entry = state
        .session(&session_id)
        .await
        .ok_or(ApiError::SessionNotFound(session_id))?;

    // 2. One turn at a time per session
    let mut chat = Arc::clone(&entry.chat)
        .try_lock_owned()
        .map_err(|_| ApiError::TurnInProgress(session_id))?;

    // 3. Run the turn in the background; deltas go out as they arrive
    let (tx, rx) = mpsc::unbounded_channel::<TurnEvent>();
    tokio::spawn(async move {
        let turn = chat.respond(&req.content, |delta| {
            let event = TurnEvent::Delta {
                fragment: delta.fragment.to_string(),
                partial: delta.partial.to_string(),
            };
            // The receiver is gone once the client disconnects
            match tx.send(event) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            }
        });
        // A model that stalls never produces the delta that would notice the disconnect
        let finished = tokio::select! {
            outcome = turn => Some(outcome),
            _ = tx.closed() => None,
        };
        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                chat.discard_open_reply();
                Ok(TurnOutcome::Cancelled)
            }
        };
        entry.touch();
        // Release the session before the final event so the next turn is never refused
        drop(chat);

        let last = match outcome {
            Ok(TurnOutcome::Completed { reply }) => TurnEvent::Done { reply },
            Ok(TurnOutcome::Skipped) => TurnEvent::Skipped,
            Ok(TurnOutcome::Failed { error }) => {
                tracing::warn!(session_id = %session_id, %error, "Turn failed");
                TurnEvent::Error { error }
            }
            Ok(TurnOutcome::Cancelled) => {
                tracing::info!(session_id = %session_id, "Client disconnected, turn cancelled");
                return;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Conversation state error");
                TurnEvent::Error { error: e.to_string() }
            }
        };
        let _ = tx.send(last);
    });

    // 4. Convert turn events to SSE events
    let sse_stream = UnboundedReceiverStream::new(rx).map(TurnEvent::into_sse);

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(TurnEvent::Skipped.name(), "skipped");
        assert_eq!(TurnEvent::Done { reply: String::new() }.name(), "done");
        assert!(TurnEvent::Delta {
            fragment: "a".into(),
            partial: "a".into()
        }
        .into_sse()
        .is_ok());
    }
}
