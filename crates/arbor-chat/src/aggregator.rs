use std::sync::Arc;

use arbor_llm::{ChatClient, ChatOptions, ChatRequest, LlmError, Message, StreamEvent};
use arbor_persist::ChatMessage;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

/// Receives the progress of one streamed completion.
///
/// `on_chunk` always gets the full text accumulated so far, never the delta.
pub trait StreamObserver {
    fn on_chunk(&mut self, accumulated: &str);

    fn on_complete(&mut self) {}

    fn on_error(&mut self, _error: &LlmError) {}
}

/// How a streamed completion ended
#[derive(Debug)]
pub enum StreamOutcome {
    Completed { content: String },
    Failed(LlmError),
    /// Stopped through the cancellation token; `partial` is what arrived first
    Cancelled { partial: String },
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }
}

/// Turns a conversation prefix into one streamed assistant reply
pub struct StreamAggregator {
    client: Arc<dyn ChatClient>,
    model: String,
    options: ChatOptions,
    system_prompt: Option<String>,
}

impl StreamAggregator {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            options: ChatOptions::default(),
            system_prompt: None,
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Prepended as a system message to every prefix. Blank prompts are ignored.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = if prompt.trim().is_empty() { None } else { Some(prompt) };
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prefix: &[ChatMessage]) -> ChatRequest {
        let mut messages = Vec::with_capacity(prefix.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(prefix.iter().map(Message::from));

        ChatRequest::new(self.model.clone(), messages).with_options(self.options.clone())
    }

    /// Stream a reply to `prefix`, reporting cumulative text to `observer`.
    ///
    /// Exactly one of `on_complete` / `on_error` fires unless the token is
    /// cancelled, in which case no further callback fires at all.
    pub async fn stream<O>(
        &self,
        prefix: &[ChatMessage],
        cancel: &CancellationToken,
        observer: &mut O,
    ) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled { partial: String::new() };
        }

        let request = self.build_request(prefix);
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Opening completion stream"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return StreamOutcome::Cancelled { partial: String::new() };
            }
            opened = self.client.chat_stream(request) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                observer.on_error(&e);
                return StreamOutcome::Failed(e);
            }
        };

        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(received = accumulated.len(), "Completion stream cancelled");
                    return StreamOutcome::Cancelled { partial: accumulated };
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(StreamEvent::Message { content })) => {
                    if content.is_empty() {
                        continue;
                    }
                    accumulated.push_str(&content);
                    observer.on_chunk(&accumulated);
                }
                Some(Ok(StreamEvent::Done { finish_reason })) => {
                    tracing::debug!(?finish_reason, "Completion stream finished");
                    break;
                }
                Some(Err(e)) => {
                    observer.on_error(&e);
                    return StreamOutcome::Failed(e);
                }
                None => break,
            }
        }

        // the observer may have cancelled from inside its last on_chunk
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled { partial: accumulated };
        }

        observer.on_complete();
        StreamOutcome::Completed { content: accumulated }
    }
}
