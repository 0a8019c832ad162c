//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust
//! use promptline::prelude::*;
//! ```

pub use crate::{
    conversation_chain, init_chat_model, lambda,
    ChatModel, ChatSession, ConversationChain, TurnOutcome,
    ChatPromptTemplate, MessageTemplate, PromptInput, PromptTemplate,
    StrOutputParser, StructuredOutputParser, ResponseSchema, Schema, SchemaParser,
    Runnable, RunnableExt,
    ChatClient, ChatOptions, Message, ModelConfig, Role,
};
