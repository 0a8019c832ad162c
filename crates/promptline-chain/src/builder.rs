use std::sync::Arc;
use anyhow::{anyhow, Result};

use promptline_llm::{ConversationBuffer, DEFAULT_HISTORY_LIMIT};

use crate::prompt::PromptInput;
use crate::runnable::Runnable;
use crate::session::{ChatSession, DEFAULT_HISTORY_KEY};

/// Builder for a [`ChatSession`] with a non-default history size or key
pub struct ChatSessionBuilder<R> {
    chain: Option<Arc<R>>,
    history_limit: usize,
    history_key: String,
}

impl<R> ChatSessionBuilder<R>
where
    R: Runnable<Input = PromptInput, Output = String>,
{
    pub fn new() -> Self {
        Self {
            chain: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_key: DEFAULT_HISTORY_KEY.to_string(),
        }
    }

    /// Set the chain that answers each turn
    pub fn chain(mut self, chain: R) -> Self {
        self.chain = Some(Arc::new(chain));
        self
    }

    /// Set a chain already shared with other sessions
    pub fn shared_chain(mut self, chain: Arc<R>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Number of committed messages to keep
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Placeholder name the chain's prompt expects the history under
    pub fn history_key(mut self, key: impl Into<String>) -> Self {
        self.history_key = key.into();
        self
    }

    pub fn build(self) -> Result<ChatSession<R>> {
        let chain = self.chain
            .ok_or_else(|| anyhow!("A chain is required"))?;
        if self.history_key.trim().is_empty() {
            return Err(anyhow!("History key must not be empty"));
        }

        Ok(ChatSession::with_buffer(
            chain,
            ConversationBuffer::with_limit(self.history_limit),
            self.history_key,
        ))
    }
}

impl<R> Default for ChatSessionBuilder<R>
where
    R: Runnable<Input = PromptInput, Output = String>,
{
    fn default() -> Self {
        Self::new()
    }
}
