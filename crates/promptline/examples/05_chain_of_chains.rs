//! Lesson 5: write a news item from a title, then extract its key facts.
//!
//! cargo run -p promptline --example 05_chain_of_chains

use promptline::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct NewsSummary {
    time: String,
    location: String,
    event: String,
}

impl Schema for NewsSummary {
    fn fields() -> Vec<ResponseSchema> {
        vec![
            ResponseSchema::new("time", "事件发生的时间"),
            ResponseSchema::new("location", "事件发生的地点"),
            ResponseSchema::new("event", "发生的具体事件"),
        ]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let model = init_chat_model(&ModelConfig::from_env()?)?;

    // Step 1: news body from a title
    let news_gen_prompt = PromptTemplate::from_template(
        "请根据以下新闻标题撰写一段简短的新闻内容（100字以内）：\n\n标题：{title}",
    )?;
    let news_chain = news_gen_prompt.pipe(model.clone());

    // Step 2: structured extraction
    let summary_prompt = PromptTemplate::from_template("请从下面这段新闻内容中提取关键信息：\n\n{news}")?;
    let summary_chain = summary_prompt.pipe(model.with_structured_output::<NewsSummary>());

    // The first chain's reply becomes the second chain's {news}
    let full_chain = news_chain
        .pipe(lambda(|news: Message| Ok(PromptInput::new().var("news", news.into_content()))))
        .pipe(summary_chain);

    let result = full_chain
        .invoke(PromptInput::new().var("title", "苹果公司在加州发布新款AI芯片"))
        .await?;

    println!("{:#?}", result);
    println!("时间: {} / 地点: {} / 事件: {}", result.time, result.location, result.event);
    Ok(())
}
