//! Multi-turn terminal chat with a persona, streaming each reply as it arrives.
//!
//! Reads QWEN_MODEL, SILICONFLOW_BASE_URL and SILICONFLOW_API_KEY (a `.env` file
//! is honored). PROMPTLINE_SYSTEM_PROMPT and PROMPTLINE_ASSISTANT_NAME change the
//! persona. Logs go to stderr; RUST_LOG controls the level.

use anyhow::Context;
use promptline::console::{
    run_console, ConsoleOptions, ASSISTANT_NAME_ENV, DEFAULT_SYSTEM_PROMPT, SYSTEM_PROMPT_ENV,
};
use promptline::{conversation_chain, init_chat_model, ChatSession, ModelConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let model_config = ModelConfig::from_env().context("Model configuration is incomplete")?;
    let model = init_chat_model(&model_config)?;

    let system_prompt = non_blank_env(SYSTEM_PROMPT_ENV).unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let mut options = ConsoleOptions::default();
    if let Some(name) = non_blank_env(ASSISTANT_NAME_ENV) {
        options = options.assistant_name(name);
    }

    let chain = conversation_chain(system_prompt, model)?;
    let mut session = ChatSession::new(Arc::new(chain));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let turns = run_console(&mut session, stdin, &mut stdout, &options).await?;

    tracing::info!(turns, "Goodbye");
    Ok(())
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
