pub mod runnable;
pub mod prompt;
pub mod parser;
pub mod model;
pub mod session;
pub mod builder;

pub use runnable::{lambda, Pipe, RunStream, Runnable, RunnableExt, RunnableLambda};
pub use prompt::{ChatPromptTemplate, MessageTemplate, PromptInput, PromptTemplate, TemplateError};
pub use parser::{
    FieldKind, ParseError, ResponseSchema, Schema, SchemaParser, StrOutputParser,
    StructuredOutputParser,
};
pub use model::{init_chat_model, ChatModel, StructuredModel};
pub use session::{
    conversation_chain, ChatSession, ConversationChain, TurnDelta, TurnOutcome, DEFAULT_HISTORY_KEY,
};
pub use builder::ChatSessionBuilder;
