#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use arbor_chat::{ChatSession, ChatStore, StreamAggregator};
use arbor_llm::{ChatClient, ChatRequest, EventStream, LlmError, StreamEvent};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

/// What the fake provider does for one `chat_stream` call
pub enum Script {
    /// Stream these deltas, then `Done`
    Reply(Vec<&'static str>),
    /// Fail before any event
    FailOpen(LlmError),
    /// Stream these deltas, then fail
    FailMidway(Vec<&'static str>, LlmError),
    /// Stream these deltas, then never finish
    Hang(Vec<&'static str>),
}

/// `ChatClient` that plays back scripts in order and records every request
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `(role, content)` pairs of the n-th request
    pub fn sent(&self, n: usize) -> Vec<(String, String)> {
        self.requests()[n]
            .messages
            .iter()
            .map(|m| (m.role().to_string(), m.content().to_string()))
            .collect()
    }
}

fn deltas(chunks: Vec<&'static str>) -> Vec<arbor_llm::Result<StreamEvent>> {
    chunks
        .into_iter()
        .map(|c| {
            Ok(StreamEvent::Message {
                content: c.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat_stream(&self, request: ChatRequest) -> arbor_llm::Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Reply(Vec::new()));

        match script {
            Script::Reply(chunks) => {
                let mut events = deltas(chunks);
                events.push(Ok(StreamEvent::Done {
                    finish_reason: Some("stop".to_string()),
                }));
                Ok(Box::pin(stream::iter(events)))
            }
            Script::FailOpen(e) => Err(e),
            Script::FailMidway(chunks, e) => {
                let mut events = deltas(chunks);
                events.push(Err(e));
                Ok(Box::pin(stream::iter(events)))
            }
            Script::Hang(chunks) => Ok(Box::pin(stream::iter(deltas(chunks)).chain(stream::pending()))),
        }
    }
}

pub fn session_with(client: Arc<ScriptedClient>) -> ChatSession {
    ChatSession::new(ChatStore::in_memory(), StreamAggregator::new(client, "test-model"))
}

pub fn contents(session: &ChatSession) -> Vec<String> {
    session.branch().iter().map(|m| m.content.clone()).collect()
}
