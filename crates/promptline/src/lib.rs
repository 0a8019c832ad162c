//! # Promptline
//!
//! Compose prompt templates, OpenAI-compatible chat models and output parsers
//! into pipelines, extract structured records from model output, and hold
//! streamed multi-turn conversations over a bounded history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use promptline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     dotenvy::dotenv().ok();
//!
//!     // QWEN_MODEL, SILICONFLOW_BASE_URL, SILICONFLOW_API_KEY
//!     let model = init_chat_model(&ModelConfig::from_env()?)?;
//!
//!     let prompt = ChatPromptTemplate::from_messages([
//!         MessageTemplate::system("你是一个乐意助人的助手，请根据用户的问题给出回答"),
//!         MessageTemplate::user("这是用户的问题： {topic}， 请用 yes 或 no 来回答"),
//!     ])?;
//!     let chain = prompt.pipe(model).pipe(StrOutputParser);
//!
//!     let answer = chain
//!         .invoke(PromptInput::new().var("topic", "请问 1 + 1 是否 大于 2？"))
//!         .await?;
//!     println!("{answer}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`promptline-llm`**: messages, the `ChatClient` trait, the OpenAI-compatible
//!   client with SSE streaming, environment configuration and the bounded
//!   conversation buffer
//! - **`promptline-chain`**: the `Runnable` pipeline abstraction, prompt
//!   templates, output parsers, `ChatModel` and the turn-driving `ChatSession`
//! - **`promptline`** (this crate): re-exports, the console chat loop and the
//!   `promptline-chat` binary
//!
//! The numbered programs under `examples/` walk through each building block.

pub mod console;
pub mod prelude;

pub use promptline_chain::{
    conversation_chain, init_chat_model, lambda, ChatModel, ChatPromptTemplate, ChatSession,
    ChatSessionBuilder, ConversationChain, FieldKind, MessageTemplate, ParseError, Pipe,
    PromptInput, PromptTemplate, ResponseSchema, RunStream, Runnable, RunnableExt,
    RunnableLambda, Schema, SchemaParser, StrOutputParser, StructuredModel,
    StructuredOutputParser, TemplateError, TurnDelta, TurnOutcome, DEFAULT_HISTORY_KEY,
};

pub use promptline_llm::{
    BufferError, ChatClient, ChatOptions, ChatRequest, ChatResponse, ConfigError,
    ConversationBuffer, Message, MockChatClient, ModelConfig, OpenAIClient, ResponseFormat,
    Role, StreamEvent, TokenUsage, DEFAULT_HISTORY_LIMIT,
};

pub use console::{is_exit_command, run_console, ConsoleOptions};
