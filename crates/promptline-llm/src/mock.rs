//! Scripted [`ChatClient`] for tests and offline demos.
//!
//! Replies are served first-in first-out. Every request is recorded so tests can
//! assert on the exact context a chain sent to the model.

use crate::streaming::{StreamEvent, TextStream};
use crate::traits::{ChatClient, ChatRequest, ChatResponse};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum ScriptedReply {
    Chunks(Vec<String>),
    Failure(String),
    /// Fragments followed by a stream that never ends
    Stall(Vec<String>),
}

#[derive(Debug, Default)]
pub struct MockChatClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply delivered as a single fragment when streamed
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Chunks(vec![text.into()]))
    }

    /// Queue a reply delivered fragment by fragment when streamed
    pub fn reply_chunks<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(ScriptedReply::Chunks(chunks.into_iter().map(Into::into).collect()))
    }

    /// Queue a reply that streams `chunks` and then hangs without finishing
    ///
    /// A non-streaming call with this reply never completes.
    pub fn reply_then_stall<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(ScriptedReply::Stall(chunks.into_iter().map(Into::into).collect()))
    }

    /// Queue a failed call
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(ScriptedReply::Failure(message.into()))
    }

    /// Every request received so far, in call order
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Replies still queued
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }

    fn push(self, reply: ScriptedReply) -> Self {
        lock(&self.script).push_back(reply);
        self
    }

    /// Next scripted fragments, and whether the reply stalls after them
    fn next_reply(&self, request: ChatRequest) -> Result<(Vec<String>, bool)> {
        lock(&self.requests).push(request);
        match lock(&self.script).pop_front() {
            Some(ScriptedReply::Chunks(chunks)) => Ok((chunks, false)),
            Some(ScriptedReply::Stall(chunks)) => Ok((chunks, true)),
            Some(ScriptedReply::Failure(message)) => Err(anyhow::anyhow!(message)),
            None => anyhow::bail!("MockChatClient: no scripted reply left"),
        }
    }
}

// A panicking test must not poison the script for the assertions that follow
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (chunks, stalls) = self.next_reply(request)?;
        if stalls {
            futures::future::pending::<()>().await;
        }
        let text = chunks.concat();
        Ok(ChatResponse {
            raw: serde_json::json!({ "content": text }),
            content: Some(text),
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream> {
        let (chunks, stalls) = self.next_reply(request)?;
        let fragments = chunks
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .map(|content| Ok(StreamEvent::Message { content }))
            .collect::<Vec<Result<StreamEvent>>>();
        let fragments = futures::stream::iter(fragments);

        if stalls {
            return Ok(Box::pin(fragments.chain(futures::stream::pending())));
        }
        let done = futures::stream::once(async {
            Ok(StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
            })
        });
        Ok(Box::pin(fragments.chain(done)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_replies_are_served_in_order() {
        let client = MockChatClient::new().reply("first").fail("offline").reply("third");
        let request = ChatRequest::new("mock", vec![Message::human("hi")]);

        assert_eq!(client.chat(request.clone()).await.unwrap().text(), "first");
        assert!(client.chat(request.clone()).await.is_err());
        assert_eq!(client.chat(request.clone()).await.unwrap().text(), "third");
        assert!(client.chat(request).await.is_err());
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn test_stream_yields_chunks_then_done() {
        let client = MockChatClient::new().reply_chunks(["a", "", "b"]);
        let stream = client
            .chat_stream(ChatRequest::new("mock", vec![Message::human("hi")]))
            .await
            .unwrap();

        let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Message { content: "a".to_string() },
                StreamEvent::Message { content: "b".to_string() },
                StreamEvent::Done { finish_reason: Some("stop".to_string()) },
            ]
        );
    }

    #[tokio::test]
    async fn test_stalled_stream_yields_chunks_then_hangs() {
        let client = MockChatClient::new().reply_then_stall(["half"]);
        let mut stream = client
            .chat_stream(ChatRequest::new("mock", vec![Message::human("hi")]))
            .await
            .unwrap();

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::Message { content: "half".to_string() }
        );
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let client = MockChatClient::new().reply("ok");
        client
            .chat(ChatRequest::new("mock", vec![Message::system("s"), Message::human("u")]))
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[1], Message::human("u"));
        assert_eq!(client.remaining(), 0);
    }
}
