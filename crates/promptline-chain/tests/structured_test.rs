use promptline_chain::{
    ChatModel, ParseError, PromptInput, PromptTemplate, ResponseSchema, Runnable, RunnableExt,
    Schema, SchemaParser, StructuredOutputParser,
};
use promptline_llm::{MockChatClient, ResponseFormat};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
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

#[derive(Debug, Deserialize, PartialEq)]
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

fn extraction_prompt(instructions: String) -> PromptTemplate {
    PromptTemplate::from_template("请根据以下内容提取用户信息，并返回 JSON 格式：\n{input}\n\n{format_instructions}")
        .unwrap()
        .partial("format_instructions", instructions)
}

#[tokio::test]
async fn test_extracts_user_record() {
    let client = Arc::new(MockChatClient::new().reply("```json\n{\"name\": \"李雷\", \"age\": \"25\"}\n```"));
    let parser = StructuredOutputParser::from_response_schemas(UserInfo::fields());
    let chain = extraction_prompt(parser.format_instructions())
        .pipe(ChatModel::new(client.clone(), "qwen"))
        .pipe(parser);

    let result = chain
        .invoke(PromptInput::new().var("input", "用户叫李雷，今年25岁，是一名工程师。"))
        .await
        .unwrap();

    assert_eq!(result["name"], json!("李雷"));
    assert_eq!(result["age"], json!(25));

    let prompt = client.requests()[0].messages[0].content().to_string();
    assert!(prompt.contains("用户叫李雷，今年25岁，是一名工程师。"));
    assert!(prompt.contains("\"age\": integer  // 用户的年龄"));
}

#[tokio::test]
async fn test_extracts_typed_record() {
    let client = Arc::new(MockChatClient::new().reply("{\"name\": \"李雷\", \"age\": 25}"));
    let parser = SchemaParser::<UserInfo>::new();
    let chain = extraction_prompt(parser.format_instructions())
        .pipe(ChatModel::new(client, "qwen"))
        .pipe(parser);

    let user = chain
        .invoke(PromptInput::new().var("input", "用户叫李雷，今年25岁，是一名工程师。"))
        .await
        .unwrap();

    assert_eq!(user, UserInfo { name: "李雷".to_string(), age: 25 });
}

#[tokio::test]
async fn test_mismatch_is_a_typed_failure() {
    let client = Arc::new(MockChatClient::new().reply("{\"name\": \"李雷\"}"));
    let parser = SchemaParser::<UserInfo>::new();
    let chain = extraction_prompt(parser.format_instructions())
        .pipe(ChatModel::new(client.clone(), "qwen"))
        .pipe(parser);

    let err = chain
        .invoke(PromptInput::new().var("input", "用户叫李雷"))
        .await
        .unwrap_err();

    match err.downcast_ref::<ParseError>() {
        Some(ParseError::MissingField(field)) => assert_eq!(field, "age"),
        other => panic!("unexpected error: {other:?}"),
    }
    // No retry
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_with_structured_output_in_chain_of_chains() {
    let client = Arc::new(
        MockChatClient::new()
            .reply("周二，苹果公司在加州发布了新款AI芯片。")
            .reply("{\"time\": \"周二\", \"location\": \"加州\", \"event\": \"苹果公司发布新款AI芯片\"}"),
    );
    let model = ChatModel::new(client.clone(), "qwen");

    let news_chain = PromptTemplate::from_template("请根据以下新闻标题撰写一段简短的新闻内容（100字以内）：\n\n标题：{title}")
        .unwrap()
        .pipe(model.clone());
    let summary_chain = PromptTemplate::from_template("请从下面这段新闻内容中提取关键信息：\n\n{news}")
        .unwrap()
        .pipe(model.with_structured_output::<NewsSummary>());
    let full_chain = news_chain
        .pipe(promptline_chain::lambda(|news: promptline_llm::Message| {
            Ok(PromptInput::new().var("news", news.into_content()))
        }))
        .pipe(summary_chain);

    let summary = full_chain
        .invoke(PromptInput::new().var("title", "苹果公司在加州发布新款AI芯片"))
        .await
        .unwrap();

    assert_eq!(
        summary,
        NewsSummary {
            time: "周二".to_string(),
            location: "加州".to_string(),
            event: "苹果公司发布新款AI芯片".to_string(),
        }
    );
    let requests = client.requests();
    assert_eq!(requests[0].options.response_format, None);
    assert_eq!(requests[1].options.response_format, Some(ResponseFormat::JsonObject));
}
