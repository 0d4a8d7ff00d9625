use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One node of a conversation tree, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// `None` for a root message
    pub parent_message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, parent_message_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            parent_message_id,
        }
    }

    pub fn user(content: impl Into<String>, parent_message_id: Option<String>) -> Self {
        Self::new(MessageRole::User, content, parent_message_id)
    }

    pub fn assistant(content: impl Into<String>, parent_message_id: Option<String>) -> Self {
        Self::new(MessageRole::Assistant, content, parent_message_id)
    }

    pub fn is_root(&self) -> bool {
        self.parent_message_id.is_none()
    }
}

// Conversion: ChatMessage → arbor_llm::Message (the prefix sent to a model)
impl From<&ChatMessage> for arbor_llm::Message {
    fn from(msg: &ChatMessage) -> Self {
        match msg.role {
            MessageRole::User => arbor_llm::Message::human(msg.content.clone()),
            MessageRole::Assistant => arbor_llm::Message::ai(msg.content.clone()),
        }
    }
}
