//! Lesson 2: model | StrOutputParser, invoked and then streamed.
//!
//! cargo run -p promptline --example 02_simple_chain

use futures::StreamExt;
use promptline::prelude::*;
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let model = init_chat_model(&ModelConfig::from_env()?)?;
    let basic_qa_chain = model.pipe(StrOutputParser);

    let question = "你好，请你介绍一下你自己。";
    let result = basic_qa_chain.invoke(vec![Message::human(question)]).await?;
    println!("{}", result);

    // Same chain, printed fragment by fragment
    let mut fragments = basic_qa_chain.stream(vec![Message::human(question)]);
    while let Some(fragment) = fragments.next().await {
        print!("{}", fragment?);
        std::io::stdout().flush()?;
    }
    println!();

    Ok(())
}
