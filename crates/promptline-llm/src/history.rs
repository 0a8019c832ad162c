//! Bounded conversation history with an in-progress (streamed) reply slot.
//!
//! The buffer keeps the most recent `limit` committed messages. A reply being
//! streamed lives in a separate accumulation slot and only becomes part of the
//! history on [`ConversationBuffer::commit_reply`]. Truncation happens only when
//! a turn ends (commit or abort), so a reply is always generated against the
//! full, untruncated context.

use crate::types::Message;
use std::collections::VecDeque;
use thiserror::Error;

/// Number of committed messages retained by default
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("a reply is already being streamed for this conversation")]
    ReplyInFlight,

    #[error("no reply is being streamed for this conversation")]
    NoReplyInFlight,
}

#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    messages: VecDeque<Message>,
    limit: usize,
    pending: Option<String>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Buffer keeping the last `limit` messages (at least one)
    pub fn with_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            messages: VecDeque::with_capacity(limit + 1),
            limit,
            pending: None,
        }
    }

    /// Append a user message. Rejected while a reply is open.
    ///
    /// Blank-input filtering is the caller's job; any text is accepted here.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), BufferError> {
        if self.pending.is_some() {
            return Err(BufferError::ReplyInFlight);
        }
        self.messages.push_back(Message::human(text));
        Ok(())
    }

    /// Open an empty accumulation slot for the assistant's reply
    pub fn begin_streaming_reply(&mut self) -> Result<(), BufferError> {
        if self.pending.is_some() {
            return Err(BufferError::ReplyInFlight);
        }
        self.pending = Some(String::new());
        Ok(())
    }

    /// Append a fragment to the open slot and return the partial reply so far
    pub fn feed_chunk(&mut self, fragment: &str) -> Result<&str, BufferError> {
        let pending = self.pending.as_mut().ok_or(BufferError::NoReplyInFlight)?;
        pending.push_str(fragment);
        Ok(pending.as_str())
    }

    /// Commit the slot as an assistant message, then drop the oldest entries
    /// beyond the limit. An empty slot commits an empty reply.
    pub fn commit_reply(&mut self) -> Result<&Message, BufferError> {
        let reply = self.pending.take().ok_or(BufferError::NoReplyInFlight)?;
        self.messages.push_back(Message::ai(reply));
        self.trim();

        // The committed reply survives truncation because limit >= 1
        self.messages.back().ok_or(BufferError::NoReplyInFlight)
    }

    /// Discard the open slot without committing anything
    ///
    /// The user message that opened the turn stays, so the history is
    /// trimmed back to the limit here as well.
    pub fn abort_reply(&mut self) -> Result<String, BufferError> {
        let discarded = self.pending.take().ok_or(BufferError::NoReplyInFlight)?;
        self.trim();
        Ok(discarded)
    }

    fn trim(&mut self) {
        let overflow = self.messages.len().saturating_sub(self.limit);
        if overflow > 0 {
            self.messages.drain(..overflow);
            tracing::debug!(dropped = overflow, limit = self.limit, "Trimmed conversation history");
        }
    }

    /// Committed messages, oldest first
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Forget all history and any open slot
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending = None;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_streaming(&self) -> bool {
        self.pending.is_some()
    }

    /// Text accumulated so far in the open slot
    pub fn partial(&self) -> Option<&str> {
        self.pending.as_deref()
    }
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new()
    }
}
