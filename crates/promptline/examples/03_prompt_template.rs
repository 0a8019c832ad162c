//! Lesson 3: a chat prompt template with a `{topic}` variable.
//!
//! cargo run -p promptline --example 03_prompt_template

use promptline::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let model = init_chat_model(&ModelConfig::from_env()?)?;

    let prompt_template = ChatPromptTemplate::from_messages([
        MessageTemplate::system("你是一个乐意助人的助手，请根据用户的问题给出回答"),
        MessageTemplate::user("这是用户的问题： {topic}， 请用 yes 或 no 来回答"),
    ])?;

    let bool_qa_chain = prompt_template.pipe(model).pipe(StrOutputParser);

    let question = "请问 1 + 1 是否 大于 2？";
    let result = bool_qa_chain.invoke(PromptInput::new().var("topic", question)).await?;
    println!("{}", result);

    Ok(())
}
