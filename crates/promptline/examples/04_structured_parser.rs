//! Lesson 4: extract a record from free text with response schemas.
//!
//! cargo run -p promptline --example 04_structured_parser

use promptline::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UserInfo {
    name: String,
    age: u32,
}

impl Schema for UserInfo {
    fn fields() -> Vec<ResponseSchema> {
        vec![
            ResponseSchema::new("name", "用户的姓名"),
            ResponseSchema::new("age", "用户的年龄").integer(),
        ]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let model = init_chat_model(&ModelConfig::from_env()?)?;

    let prompt = PromptTemplate::from_template(
        "请根据以下内容提取用户信息，并返回 JSON 格式：\n{input}\n\n{format_instructions}",
    )?;

    // Untyped: a JSON object with every declared field
    let parser = StructuredOutputParser::from_response_schemas(UserInfo::fields());
    let chain = prompt
        .clone()
        .partial("format_instructions", parser.format_instructions())
        .pipe(model.clone())
        .pipe(parser);
    let result = chain
        .invoke(PromptInput::new().var("input", "用户叫李雷，今年25岁，是一名工程师。"))
        .await?;
    println!("{}", serde_json::Value::Object(result));

    // Typed: the same fields deserialized into UserInfo
    let parser = SchemaParser::<UserInfo>::new();
    let chain = prompt
        .partial("format_instructions", parser.format_instructions())
        .pipe(model)
        .pipe(parser);
    let user = chain
        .invoke(PromptInput::new().var("input", "用户叫李雷，今年25岁，是一名工程师。"))
        .await?;
    println!("{} ({})", user.name, user.age);

    Ok(())
}
