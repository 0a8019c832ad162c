use anyhow::Result;
use futures::{Stream, StreamExt};
use std::fmt::Display;

use super::buffering::CircularLineBuffer;
use crate::streaming::{StreamEvent, TextStream};

/// Strategy pattern for parsing different SSE payload types
pub trait SseLineParser: Send {
    /// Parse a data line into stream events
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>>;

    /// Check if this line signals end of stream
    fn is_done_marker(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

/// Generic SSE stream parser using circular buffer
///
/// Works over any byte stream (a `reqwest` body, or an in-memory stream in tests).
/// Events are yielded in the order their lines arrive; the stream ends after the
/// done marker or when the source is exhausted.
pub fn parse_sse_stream<S, B, E, P>(bytes: S, parser: P) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = CircularLineBuffer::with_capacity(4096);
        let mut finished = false;

        'outer: while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(bytes.as_ref());

                    while let Some(line_result) = buffer.next_line() {
                        match line_result {
                            Ok(line) => {
                                match handle_line(&parser, &line) {
                                    LineOutcome::Events(Ok(events)) => {
                                        for event in events {
                                            yield Ok(event);
                                        }
                                    }
                                    LineOutcome::Events(Err(e)) => yield Err(e),
                                    LineOutcome::Done => {
                                        yield Ok(StreamEvent::Done { finish_reason: None });
                                        finished = true;
                                        break 'outer;
                                    }
                                    LineOutcome::Skip => {}
                                }
                            }
                            Err(e) => yield Err(e),
                        }
                    }
                }
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    finished = true;
                    break;
                }
            }
        }

        // Source ended without a trailing newline
        let tail = if finished { None } else { buffer.take_remaining() };
        if let Some(Ok(line)) = tail {
            match handle_line(&parser, &line) {
                LineOutcome::Events(Ok(events)) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                LineOutcome::Events(Err(e)) => yield Err(e),
                LineOutcome::Done => yield Ok(StreamEvent::Done { finish_reason: None }),
                LineOutcome::Skip => {}
            }
        }
    })
}

enum LineOutcome {
    Events(Result<Vec<StreamEvent>>),
    Done,
    Skip,
}

fn handle_line<P: SseLineParser>(parser: &P, line: &str) -> LineOutcome {
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    // SSE comments and non-data fields (event:, id:, retry:) carry no payload here
    let Some(data) = line.strip_prefix("data:") else {
        return LineOutcome::Skip;
    };
    let data = data.trim_start();

    if parser.is_done_marker(data) {
        return LineOutcome::Done;
    }

    LineOutcome::Events(parser.parse_data_line(data))
}
