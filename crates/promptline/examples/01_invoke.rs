//! Lesson 1: call a chat model once and print the whole reply.
//!
//! cargo run -p promptline --example 01_invoke

use promptline::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let model = init_chat_model(&ModelConfig::from_env()?)?;

    let question = "你好，请问你是";
    let result = model.invoke(vec![Message::human(question)]).await?;

    println!("{:?}", result);
    Ok(())
}
