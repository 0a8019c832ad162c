pub mod types;
pub mod traits;
pub mod config;
pub mod streaming;
pub mod buffer_utils;
pub mod openai;
pub mod history;
pub mod mock;

pub use traits::{
    ChatClient,
    ChatRequest, ChatResponse, ChatOptions, ResponseFormat,
    TokenUsage,
};

pub use config::{ConfigError, ModelConfig};
pub use streaming::{StreamEvent, TextStream};
pub use buffer_utils::CircularLineBuffer;
pub use openai::OpenAIClient;
pub use history::{BufferError, ConversationBuffer, DEFAULT_HISTORY_LIMIT};
pub use mock::MockChatClient;
pub use types::{Message, Role};
