use crate::parser::{Schema, SchemaParser};
use crate::runnable::{RunStream, Runnable};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use promptline_llm::{
    ChatClient, ChatOptions, ChatRequest, Message, ModelConfig, OpenAIClient, ResponseFormat,
    StreamEvent,
};
use std::fmt;
use std::sync::Arc;

/// Construct a chat model for an OpenAI-compatible provider
///
/// The configuration is validated before any client is built, so a bad
/// environment fails here rather than on the first request.
pub fn init_chat_model(config: &ModelConfig) -> Result<ChatModel> {
    config.validate()?;

    let client = OpenAIClient::new(config.api_key.clone())?.with_base_url(config.base_url.clone());
    tracing::info!(model = %config.model, base_url = %config.base_url, "Initialized chat model");

    Ok(ChatModel::new(Arc::new(client), config.model.clone()))
}

/// Chat model as a pipeline stage: a message list in, an assistant message out
#[derive(Clone)]
pub struct ChatModel {
    client: Arc<dyn ChatClient>,
    model: String,
    options: ChatOptions,
}

impl ChatModel {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    /// Same model, answering with a `T` parsed from JSON output
    pub fn with_structured_output<T: Schema>(&self) -> StructuredModel<T> {
        let model = self.clone().with_options(
            self.options
                .clone()
                .response_format(ResponseFormat::JsonObject),
        );
        StructuredModel {
            model,
            parser: SchemaParser::new(),
        }
    }

    fn request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest::new(self.model.clone(), messages).with_options(self.options.clone())
    }
}

impl fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatModel")
            .field("model", &self.model)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Runnable for ChatModel {
    type Input = Vec<Message>;
    type Output = Message;

    async fn invoke(&self, messages: Vec<Message>) -> Result<Message> {
        tracing::debug!(model = %self.model, messages = messages.len(), "Invoking chat model");

        let response = self
            .client
            .chat(self.request(messages))
            .await
            .with_context(|| format!("Chat model {} call failed", self.model))?;

        Ok(Message::ai(response.content.unwrap_or_default()))
    }

    /// One assistant message per text fragment, in arrival order
    fn transform<'a>(&'a self, mut inputs: RunStream<'a, Vec<Message>>) -> RunStream<'a, Message> {
        Box::pin(async_stream::stream! {
            'inputs: while let Some(input) = inputs.next().await {
                let messages = match input {
                    Ok(messages) => messages,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                tracing::debug!(model = %self.model, messages = messages.len(), "Streaming chat model");

                let mut fragments = match self.client.chat_stream(self.request(messages)).await {
                    Ok(fragments) => fragments,
                    Err(e) => {
                        yield Err(e.context(format!("Chat model {} call failed", self.model)));
                        break;
                    }
                };

                while let Some(event) = fragments.next().await {
                    match event {
                        Ok(StreamEvent::Message { content }) => yield Ok(Message::ai(content)),
                        Ok(StreamEvent::Done { finish_reason }) => {
                            tracing::debug!(?finish_reason, "Chat model stream finished");
                            break;
                        }
                        Err(e) => {
                            yield Err(e);
                            break 'inputs;
                        }
                    }
                }
            }
        })
    }
}

/// Chat model whose replies are parsed into a schema record
///
/// The schema's format instructions are sent as a leading system message and the
/// provider is asked for a JSON object.
pub struct StructuredModel<T> {
    model: ChatModel,
    parser: SchemaParser<T>,
}

impl<T: Schema> StructuredModel<T> {
    pub fn format_instructions(&self) -> String {
        self.parser.format_instructions()
    }

    fn with_instructions(&self, mut messages: Vec<Message>) -> Vec<Message> {
        messages.insert(0, Message::system(self.parser.format_instructions()));
        messages
    }
}

impl<T> Clone for StructuredModel<T> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            parser: self.parser.clone(),
        }
    }
}

impl<T> fmt::Debug for StructuredModel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredModel")
            .field("model", &self.model)
            .field("parser", &self.parser)
            .finish()
    }
}

#[async_trait]
impl<T: Schema> Runnable for StructuredModel<T> {
    type Input = Vec<Message>;
    type Output = T;

    async fn invoke(&self, messages: Vec<Message>) -> Result<T> {
        let reply = self.model.invoke(self.with_instructions(messages)).await?;
        Ok(self.parser.parse(reply.content())?)
    }

    fn transform<'a>(&'a self, inputs: RunStream<'a, Vec<Message>>) -> RunStream<'a, T> {
        let inputs: RunStream<'a, Vec<Message>> =
            Box::pin(inputs.map(move |input| input.map(|messages| self.with_instructions(messages))));
        self.parser.transform(self.model.transform(inputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ResponseSchema;
    use futures::TryStreamExt;
    use promptline_llm::{MockChatClient, Role};
    use serde::Deserialize;

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

    #[tokio::test]
    async fn test_invoke_returns_assistant_message() {
        let client = Arc::new(MockChatClient::new().reply("1 + 1 = 2"));
        let model = ChatModel::new(client.clone(), "qwen");

        let reply = model.invoke(vec![Message::human("1 + 1 = ?")]).await.unwrap();

        assert_eq!(reply, Message::ai("1 + 1 = 2"));
        assert_eq!(client.requests()[0].model, "qwen");
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_in_order() {
        let client = Arc::new(MockChatClient::new().reply_chunks(["你", "好", "！"]));
        let model = ChatModel::new(client, "qwen");

        let fragments: Vec<Message> = model
            .stream(vec![Message::human("hi")])
            .try_collect()
            .await
            .unwrap();

        assert_eq!(
            fragments,
            vec![Message::ai("你"), Message::ai("好"), Message::ai("！")]
        );
    }

    #[tokio::test]
    async fn test_stream_surfaces_call_failure() {
        let client = Arc::new(MockChatClient::new().fail("connection reset"));
        let model = ChatModel::new(client, "qwen");

        let result: Result<Vec<Message>> = model.stream(vec![Message::human("hi")]).try_collect().await;
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"));
    }

    #[tokio::test]
    async fn test_options_are_forwarded() {
        let client = Arc::new(MockChatClient::new().reply("ok"));
        let model = ChatModel::new(client.clone(), "qwen").with_options(ChatOptions::new().temperature(0.2));

        model.invoke(vec![Message::human("hi")]).await.unwrap();

        assert_eq!(client.requests()[0].options.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn test_structured_output_prepends_instructions_and_requests_json() {
        let client = Arc::new(MockChatClient::new().reply(
            r#"{"time": "周二", "location": "加州", "event": "苹果公司发布新款AI芯片"}"#,
        ));
        let model = ChatModel::new(client.clone(), "qwen").with_structured_output::<NewsSummary>();

        let summary = model
            .invoke(vec![Message::human("请从下面这段新闻内容中提取关键信息")])
            .await
            .unwrap();

        assert_eq!(summary.location, "加州");
        let requests = client.requests();
        let request = &requests[0];
        assert_eq!(request.options.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(request.messages[0].role(), Role::System);
        assert!(request.messages[0].content().contains("\"event\": string"));
        assert_eq!(request.messages[1].role(), Role::User);
    }

    #[tokio::test]
    async fn test_structured_output_streams_one_record() {
        let client = Arc::new(MockChatClient::new().reply_chunks([
            r#"{"time": "周二", "#,
            r#""location": "加州", "event": "发布会"}"#,
        ]));
        let model = ChatModel::new(client, "qwen").with_structured_output::<NewsSummary>();

        let records: Vec<NewsSummary> = model
            .stream(vec![Message::human("news")])
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "发布会");
    }

    #[test]
    fn test_init_chat_model_rejects_bad_config() {
        let config = ModelConfig::new("qwen", "not-a-url", "sk-test");
        assert!(init_chat_model(&config).is_err());

        let config = ModelConfig::new("qwen", "https://api.siliconflow.cn/v1/", "sk-test");
        let model = init_chat_model(&config).unwrap();
        assert_eq!(model.model(), "qwen");
    }
}
