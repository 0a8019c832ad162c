//! Multi-turn conversation driver.
//!
//! A [`ChatSession`] owns one bounded history and runs every user turn through a
//! chain that receives the committed history under a message placeholder. The
//! reply is streamed: each fragment is accumulated in the history's open slot
//! and reported with the partial reply so far, and the reply is committed only
//! once the stream has finished.

use crate::builder::ChatSessionBuilder;
use crate::model::ChatModel;
use crate::parser::StrOutputParser;
use crate::prompt::{ChatPromptTemplate, MessageTemplate, PromptInput, TemplateError};
use crate::runnable::{Pipe, Runnable, RunnableExt};
use futures::StreamExt;
use promptline_llm::{BufferError, ConversationBuffer, Message};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Placeholder name the history is passed under unless configured otherwise
pub const DEFAULT_HISTORY_KEY: &str = "messages";

/// `system prompt + history | model | text`, the chain behind both chat surfaces
pub type ConversationChain = Pipe<Pipe<ChatPromptTemplate, ChatModel>, StrOutputParser>;

/// Build the persona chain: a fixed system message followed by the history
pub fn conversation_chain(
    system_prompt: impl Into<String>,
    model: ChatModel,
) -> Result<ConversationChain, TemplateError> {
    let prompt = ChatPromptTemplate::from_messages([
        MessageTemplate::from(Message::system(system_prompt)),
        MessageTemplate::placeholder(DEFAULT_HISTORY_KEY),
    ])?;
    Ok(prompt.pipe(model).pipe(StrOutputParser))
}

/// One streamed fragment and the reply accumulated so far (fragment included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnDelta<'a> {
    pub fragment: &'a str,
    pub partial: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input: nothing appended, no model call
    Skipped,
    /// Reply committed to the history
    Completed { reply: String },
    /// The delta callback asked to stop; the partial reply was discarded
    Cancelled,
    /// The model call failed; the user message stays in the history
    Failed { error: String },
}

pub struct ChatSession<R> {
    chain: Arc<R>,
    buffer: ConversationBuffer,
    history_key: String,
}

impl<R> ChatSession<R>
where
    R: Runnable<Input = PromptInput, Output = String>,
{
    pub fn new(chain: Arc<R>) -> Self {
        Self::with_buffer(chain, ConversationBuffer::new(), DEFAULT_HISTORY_KEY)
    }

    pub fn with_buffer(chain: Arc<R>, buffer: ConversationBuffer, history_key: impl Into<String>) -> Self {
        Self {
            chain,
            buffer,
            history_key: history_key.into(),
        }
    }

    pub fn builder() -> ChatSessionBuilder<R> {
        ChatSessionBuilder::new()
    }

    /// Run one user turn
    ///
    /// `on_delta` is called once per fragment, in arrival order. Returning
    /// `ControlFlow::Break(())` cancels the turn.
    pub async fn respond<F>(&mut self, text: &str, mut on_delta: F) -> Result<TurnOutcome, BufferError>
    where
        F: FnMut(TurnDelta<'_>) -> ControlFlow<()> + Send,
    {
        if text.trim().is_empty() {
            tracing::debug!("Skipping blank input");
            return Ok(TurnOutcome::Skipped);
        }

        if let Some(stale) = self.discard_open_reply() {
            tracing::warn!(discarded_bytes = stale.len(), "Discarding reply left open by an abandoned turn");
        }

        self.buffer.append_user(text)?;
        self.buffer.begin_streaming_reply()?;

        let input = PromptInput::new().messages(self.history_key.clone(), self.buffer.snapshot());
        tracing::debug!(history = self.buffer.len(), "Starting turn");

        let chain = Arc::clone(&self.chain);
        let mut fragments = chain.stream(input);

        while let Some(fragment) = fragments.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(e) => {
                    self.buffer.abort_reply()?;
                    let error = format!("{e:#}");
                    tracing::warn!(%error, "Turn failed, reply discarded");
                    return Ok(TurnOutcome::Failed { error });
                }
            };

            let partial = self.buffer.feed_chunk(&fragment)?;
            let flow = on_delta(TurnDelta {
                fragment: &fragment,
                partial,
            });
            if flow.is_break() {
                let discarded = self.buffer.abort_reply()?;
                tracing::info!(discarded_bytes = discarded.len(), "Turn cancelled");
                return Ok(TurnOutcome::Cancelled);
            }
        }

        let reply = self.buffer.commit_reply()?.content().to_string();
        tracing::debug!(reply_bytes = reply.len(), history = self.buffer.len(), "Turn completed");

        Ok(TurnOutcome::Completed { reply })
    }

    /// Drop the reply slot of a turn whose future was dropped mid-stream
    ///
    /// Returns the discarded partial reply, or `None` when no turn was open.
    pub fn discard_open_reply(&mut self) -> Option<String> {
        if !self.buffer.is_streaming() {
            return None;
        }
        self.buffer.abort_reply().ok()
    }

    /// Committed history, oldest first
    pub fn history(&self) -> Vec<Message> {
        self.buffer.snapshot()
    }

    /// Forget the whole conversation
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    pub fn history_key(&self) -> &str {
        &self.history_key
    }

    pub fn chain(&self) -> &Arc<R> {
        &self.chain
    }
}
