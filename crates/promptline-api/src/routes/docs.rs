use axum::Json;
use utoipa::OpenApi;

use crate::handlers::stream;
use crate::routes::{health, sessions};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        sessions::create_session,
        sessions::get_session,
        sessions::delete_session,
        sessions::clear_session,
        stream::send_message_stream,
    ),
    components(schemas(
        health::HealthResponse,
        sessions::SessionCreated,
        sessions::SessionResponse,
        sessions::MessageView,
        stream::SendMessageRequest,
    )),
    tags(
        (name = "health", description = "Service status"),
        (name = "sessions", description = "Conversation lifecycle"),
        (name = "messages", description = "Streamed chat turns")
    )
)]
pub struct ApiDoc;

/// OpenAPI document for the HTTP surface
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
