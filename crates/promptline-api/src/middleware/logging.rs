use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Request logging middleware
///
/// Logs the route template rather than the raw URI so session ids stay out of
/// the aggregated logs. For streamed replies the duration covers the time to
/// response headers only.
pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(%method, %route, %status, duration_ms, "Request failed");
    } else {
        tracing::info!(%method, %route, %status, duration_ms, "Request processed");
    }

    response
}
