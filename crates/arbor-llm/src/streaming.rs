use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::buffer_utils::CircularLineBuffer;
use crate::error::LlmError;
use crate::traits::EventStream;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text delta of the assistant message
    Message {
        content: String,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
}

/// Error payload some providers emit in place of a chunk
#[derive(Debug, Clone, Deserialize)]
struct ErrorFrame {
    error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl ChatStreamChunk {
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }

    pub fn is_done(&self) -> bool {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_ref())
            .is_some()
    }

    fn to_stream_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(choice) = self.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Message {
                        content: content.clone(),
                    });
                }
            }

            if let Some(finish_reason) = &choice.finish_reason {
                events.push(StreamEvent::Done {
                    finish_reason: Some(finish_reason.clone()),
                });
            }
        }

        events
    }
}

/// What one SSE line means for the event stream
#[derive(Debug)]
pub enum SseLine {
    /// Blank line, comment, non-data field, or a malformed frame
    Skip,
    Events(Vec<StreamEvent>),
    /// `data: [DONE]`
    Terminator,
    /// The provider reported an error inside the stream
    Failed(LlmError),
}

/// Interpret a single trimmed SSE line.
///
/// Malformed JSON frames are logged and skipped so that one bad frame does
/// not abort an otherwise healthy stream.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();

    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Terminator;
    }

    match serde_json::from_str::<ChatStreamChunk>(data) {
        Ok(chunk) if !chunk.choices.is_empty() => SseLine::Events(chunk.to_stream_events()),
        Ok(_) => match serde_json::from_str::<ErrorFrame>(data) {
            Ok(frame) => SseLine::Failed(LlmError::Stream(frame.error.message)),
            // keep-alive or usage-only chunk
            Err(_) => SseLine::Skip,
        },
        Err(e) => {
            tracing::warn!(error = %e, frame = data, "Skipping malformed SSE frame");
            SseLine::Skip
        }
    }
}

/// Turn a raw byte stream of `text/event-stream` data into `StreamEvent`s.
///
/// The returned stream yields `Done` on the `[DONE]` terminator or a
/// `finish_reason`, and ends after the first terminator or the first error.
pub fn parse_chat_sse_stream<S, B, E>(byte_stream: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(byte_stream);
        let mut buffer = CircularLineBuffer::with_capacity(8192);

        'read: loop {
            let closed = match byte_chunks.next().await {
                Some(Ok(bytes)) => {
                    buffer.extend(bytes.as_ref());
                    false
                }
                Some(Err(e)) => {
                    yield Err(e.into());
                    break 'read;
                }
                None => true,
            };

            loop {
                let next = if closed { buffer.finish() } else { buffer.next_line() };
                let Some(line_result) = next else { break };

                let line = match line_result {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(bytes = e.len, reason = %e.reason, "Skipping unreadable SSE line");
                        continue;
                    }
                };

                match parse_sse_line(&line) {
                    SseLine::Skip => {}
                    SseLine::Events(events) => {
                        for event in events {
                            let finished = matches!(event, StreamEvent::Done { .. });
                            yield Ok(event);
                            if finished {
                                break 'read;
                            }
                        }
                    }
                    SseLine::Terminator => {
                        yield Ok(StreamEvent::Done { finish_reason: None });
                        break 'read;
                    }
                    SseLine::Failed(e) => {
                        yield Err(e);
                        break 'read;
                    }
                }
            }

            if closed {
                break 'read;
            }
        }
    })
}
