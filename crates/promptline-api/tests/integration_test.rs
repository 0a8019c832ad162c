use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use promptline_api::{build_router, config::Config, error::ApiError, state::AppState};
use promptline_chain::{conversation_chain, ChatModel};
use promptline_llm::MockChatClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

fn app_state(client: Arc<MockChatClient>, config: Config) -> Arc<AppState> {
    let chain = conversation_chain(
        config.chat.system_prompt.clone(),
        ChatModel::new(client, "qwen"),
    )
    .unwrap();
    Arc::new(AppState::new(config, chain))
}

async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> Response {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    build_router(Arc::clone(state)).oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// (event name, data) pairs of an SSE body
fn sse_events(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = serde_json::from_str(payload.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}

async fn new_session(state: &Arc<AppState>) -> String {
    let response = send(state, "POST", "/sessions", None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let state = app_state(Arc::new(MockChatClient::new()), Config::default());

    let response = send(&state, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_index_page_shows_assistant_name() {
    let state = app_state(Arc::new(MockChatClient::new()), Config::default());

    let response = send(&state, "GET", "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("与 杨紫 聊天"));
    assert!(!html.contains("__ASSISTANT_NAME__"));
}

#[tokio::test]
async fn test_streamed_turn_commits_reply() {
    let client = Arc::new(MockChatClient::new().reply_chunks(["你好", "，我是", "杨紫"]));
    let state = app_state(client.clone(), Config::default());
    let id = new_session(&state).await;

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "你好" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let events = sse_events(&body_text(response).await);
    assert_eq!(
        events,
        vec![
            ("delta".to_string(), json!({ "fragment": "你好", "partial": "你好" })),
            ("delta".to_string(), json!({ "fragment": "，我是", "partial": "你好，我是" })),
            ("delta".to_string(), json!({ "fragment": "杨紫", "partial": "你好，我是杨紫" })),
            ("done".to_string(), json!({ "reply": "你好，我是杨紫" })),
        ]
    );

    let history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
    assert_eq!(
        history["messages"],
        json!([
            { "role": "user", "content": "你好" },
            { "role": "assistant", "content": "你好，我是杨紫" },
        ])
    );
    assert_eq!(history["busy"], false);

    let requests = client.requests();
    assert_eq!(requests[0].messages[0].content(), "你叫杨紫，是著名女演员。");
}

#[tokio::test]
async fn test_blank_message_is_skipped() {
    let client = Arc::new(MockChatClient::new());
    let state = app_state(client.clone(), Config::default());
    let id = new_session(&state).await;

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "   " })),
    )
    .await;

    let events = sse_events(&body_text(response).await);
    assert_eq!(events, vec![("skipped".to_string(), json!({}))]);
    assert_eq!(client.call_count(), 0);

    let history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
    assert_eq!(history["messages"], json!([]));
}

#[tokio::test]
async fn test_model_failure_becomes_error_event() {
    let client = Arc::new(MockChatClient::new().fail("API error (503 Service Unavailable): busy"));
    let state = app_state(client, Config::default());
    let id = new_session(&state).await;

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "在吗？" })),
    )
    .await;

    let events = sse_events(&body_text(response).await);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    assert!(events[0].1["error"].as_str().unwrap().contains("503"));

    let history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
    assert_eq!(history["messages"], json!([{ "role": "user", "content": "在吗？" }]));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let client = Arc::new(MockChatClient::new().reply("first reply").reply("second reply"));
    let state = app_state(client.clone(), Config::default());
    let first = new_session(&state).await;
    let second = new_session(&state).await;

    for (id, text) in [(&first, "from first"), (&second, "from second")] {
        let response = send(
            &state,
            "POST",
            &format!("/sessions/{id}/messages"),
            Some(json!({ "content": text })),
        )
        .await;
        body_text(response).await;
    }

    let history = body_json(send(&state, "GET", &format!("/sessions/{second}"), None).await).await;
    assert_eq!(history["messages"][0]["content"], "from second");
    assert_eq!(history["messages"].as_array().unwrap().len(), 2);
    // persona + the second session's own message only
    assert_eq!(client.requests()[1].messages.len(), 2);
}

#[tokio::test]
async fn test_history_limit_from_config() {
    let client = Arc::new(MockChatClient::new().reply("a1").reply("a2").reply("a3"));
    let mut config = Config::default();
    config.chat.history_limit = 4;
    let state = app_state(client, config);
    let id = new_session(&state).await;

    for text in ["q1", "q2", "q3"] {
        let response = send(
            &state,
            "POST",
            &format!("/sessions/{id}/messages"),
            Some(json!({ "content": text })),
        )
        .await;
        body_text(response).await;
    }

    let history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
    assert_eq!(history["history_limit"], 4);
    assert_eq!(
        history["messages"],
        json!([
            { "role": "user", "content": "q2" },
            { "role": "assistant", "content": "a2" },
            { "role": "user", "content": "q3" },
            { "role": "assistant", "content": "a3" },
        ])
    );
}

#[tokio::test]
async fn test_clear_and_delete() {
    let client = Arc::new(MockChatClient::new().reply("ok"));
    let state = app_state(client, Config::default());
    let id = new_session(&state).await;

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "hi" })),
    )
    .await;
    body_text(response).await;

    let response = send(&state, "POST", &format!("/sessions/{id}/clear"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
    assert_eq!(history["messages"], json!([]));

    let response = send(&state, "DELETE", &format!("/sessions/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&state, "GET", &format!("/sessions/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let state = app_state(Arc::new(MockChatClient::new()), Config::default());
    let id = Uuid::new_v4();

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "hi" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("Session not found"));

    for (method, uri) in [
        ("GET", format!("/sessions/{id}")),
        ("DELETE", format!("/sessions/{id}")),
        ("POST", format!("/sessions/{id}/clear")),
    ] {
        assert_eq!(send(&state, method, &uri, None).await.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_busy_session_conflicts() {
    let client = Arc::new(MockChatClient::new().reply("unused"));
    let state = app_state(client.clone(), Config::default());
    let id = new_session(&state).await;

    let entry = state.session(&id.parse().unwrap()).await.unwrap();
    let _turn = entry.chat.lock().await;

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "hi" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(&state, "POST", &format!("/sessions/{id}/clear"), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
    assert_eq!(history["busy"], true);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_client_disconnect_cancels_turn() {
    let client = Arc::new(
        MockChatClient::new()
            .reply_then_stall(["从前有座山，"])
            .reply("好的，重新开始"),
    );
    let state = app_state(client.clone(), Config::default());
    let id = new_session(&state).await;

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "讲个故事" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Read the first delta, then hang up while the model is still going
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("从前有座山"));
    drop(body);

    let mut history = Value::Null;
    for _ in 0..100 {
        history = body_json(send(&state, "GET", &format!("/sessions/{id}"), None).await).await;
        if history["busy"] == false {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(history["busy"], false);
    assert_eq!(history["messages"], json!([{ "role": "user", "content": "讲个故事" }]));

    let response = send(
        &state,
        "POST",
        &format!("/sessions/{id}/messages"),
        Some(json!({ "content": "再讲一次" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let events = sse_events(&body_text(response).await);
    assert_eq!(
        events.last(),
        Some(&("done".to_string(), json!({ "reply": "好的，重新开始" })))
    );

    // The abandoned partial reply never reaches the model
    let requests = client.requests();
    assert_eq!(
        requests[1].messages.iter().map(|m| m.content()).collect::<Vec<_>>(),
        vec!["你叫杨紫，是著名女演员。", "讲个故事", "再讲一次"]
    );
}

#[tokio::test]
async fn test_script_name_is_json_encoded() {
    let mut config = Config::default();
    config.chat.assistant_name = r#"O'Neil & "Co" \"#.to_string();
    let state = app_state(Arc::new(MockChatClient::new()), config);

    let html = body_text(send(&state, "GET", "/", None).await).await;
    assert!(html.contains(r#"const ASSISTANT = "O'Neil & \"Co\" \\";"#));
    assert!(html.contains("与 O&#39;Neil &amp; &quot;Co&quot; \\ 聊天"));
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let state = app_state(Arc::new(MockChatClient::new()), Config::default());

    let doc = body_json(send(&state, "GET", "/api/openapi.json", None).await).await;

    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/health"));
    assert!(paths.contains_key("/sessions"));
    assert!(paths.contains_key("/sessions/{session_id}/messages"));
}

#[tokio::test]
async fn test_api_error_response() {
    let response = ApiError::BadRequest("Test error".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid request: Test error");
}
