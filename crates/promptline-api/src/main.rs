use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use promptline_api::{
    build_router,
    config::Config,
    state::{spawn_session_sweeper, AppState},
};
use promptline_chain::{conversation_chain, init_chat_model};
use promptline_llm::ModelConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config);

    tracing::info!("Starting promptline web chat");

    // Model credentials come from the environment only; fail before binding
    let model_config = ModelConfig::from_env().context("Model configuration is incomplete")?;
    let model = init_chat_model(&model_config)?;
    let chain = conversation_chain(config.chat.system_prompt.clone(), model)?;

    let state = Arc::new(AppState::new(config.clone(), chain));
    spawn_session_sweeper(
        Arc::clone(&state),
        config.chat.session_sweep_interval(),
        config.chat.session_idle_timeout(),
    );
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("OpenAPI document: http://{}/api/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
