use axum::{extract::State, response::Html};
use std::sync::Arc;

use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../../static/index.html");
/// Name as HTML text
const NAME_SLOT: &str = "__ASSISTANT_NAME__";
/// Name as a JavaScript string literal
const NAME_JSON_SLOT: &str = "__ASSISTANT_NAME_JSON__";

/// Single-page chat UI
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_page(&state.config.chat.assistant_name))
}

fn render_page(assistant_name: &str) -> String {
    INDEX_HTML
        .replace(NAME_JSON_SLOT, &script_string(assistant_name))
        .replace(NAME_SLOT, &escape_html(assistant_name))
}

/// JSON string literal that cannot close the surrounding `<script>` element
fn script_string(text: &str) -> String {
    serde_json::Value::from(text)
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
