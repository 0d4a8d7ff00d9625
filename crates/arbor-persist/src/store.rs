use std::collections::HashMap;

use crate::backends::{ChatBackend, MemoryBackend};
use crate::error::{PersistError, Result};
use crate::models::{Chat, ChatMessage};
use crate::tree::MessageTree;

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

const TITLE_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Alternatives at one conversational position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Siblings {
    /// Same parent and role, oldest first
    pub messages: Vec<ChatMessage>,
    /// Position of the queried message in `messages`
    pub current_index: usize,
}

impl Siblings {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Owns every chat and its message tree
///
/// The collection is loaded once from the backend and written back whole
/// after each mutation. Lookups of unknown chats or messages degrade to
/// `None`, empty results or no-ops.
pub struct ChatStore {
    backend: Box<dyn ChatBackend>,
    chats: HashMap<String, Chat>,
}

impl ChatStore {
    /// Load the collection stored in `backend`
    pub fn open(backend: impl ChatBackend + 'static) -> Result<Self> {
        let chats = match backend.read()? {
            Some(document) if !document.trim().is_empty() => {
                serde_json::from_str::<Vec<Chat>>(&document)?
            }
            _ => Vec::new(),
        };

        tracing::debug!(chats = chats.len(), "Chat store opened");

        Ok(Self {
            backend: Box::new(backend),
            chats: chats.into_iter().map(|c| (c.id.clone(), c)).collect(),
        })
    }

    /// Empty store that keeps nothing beyond the process
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            chats: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn create_chat(&mut self, title: &str) -> Result<Chat> {
        let title = title.trim();
        let chat = Chat::new(if title.is_empty() { DEFAULT_CHAT_TITLE } else { title });

        self.chats.insert(chat.id.clone(), chat.clone());
        self.save()?;

        tracing::info!(chat_id = %chat.id, title = %chat.title, "Created chat");
        Ok(chat)
    }

    pub fn get_chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    /// All chats, most recently updated first
    pub fn all_chats(&self) -> Vec<&Chat> {
        let mut chats: Vec<&Chat> = self.chats.values().collect();
        chats.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        chats
    }

    /// Append `message` and make it the current leaf.
    ///
    /// Unknown chat: no-op. The message's parent must already be in the chat.
    pub fn add_message(&mut self, chat_id: &str, message: ChatMessage) -> Result<()> {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            tracing::debug!(chat_id, "add_message on unknown chat ignored");
            return Ok(());
        };

        if chat.contains(&message.id) {
            return Err(PersistError::DuplicateMessage {
                chat_id: chat_id.to_string(),
                message_id: message.id,
            });
        }
        if let Some(parent_id) = message.parent_message_id.as_deref() {
            if !chat.contains(parent_id) {
                return Err(PersistError::DanglingParent {
                    chat_id: chat_id.to_string(),
                    message_id: message.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }

        chat.current_leaf_message_id = Some(message.id.clone());
        chat.messages.push(message);
        chat.touch();

        self.save()
    }

    /// Replace the content of an existing message. Returns `false` (and
    /// writes nothing) if the chat or message is unknown.
    pub fn update_message_content(
        &mut self,
        chat_id: &str,
        message_id: &str,
        content: impl Into<String>,
    ) -> Result<bool> {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return Ok(false);
        };
        let Some(message) = chat.message_mut(message_id) else {
            return Ok(false);
        };

        message.content = content.into();
        chat.touch();

        self.save()?;
        Ok(true)
    }

    /// Root-first path to the chat's current leaf
    pub fn active_branch(&self, chat_id: &str) -> Vec<ChatMessage> {
        let Some(chat) = self.chats.get(chat_id) else {
            return Vec::new();
        };
        let Some(leaf_id) = chat.current_leaf_message_id.as_deref() else {
            return Vec::new();
        };

        MessageTree::new(&chat.messages)
            .path_to(leaf_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn siblings(&self, chat_id: &str, message_id: &str) -> Siblings {
        let Some(chat) = self.chats.get(chat_id) else {
            return Siblings::default();
        };

        match MessageTree::new(&chat.messages).siblings(message_id) {
            Some((messages, current_index)) => Siblings {
                messages: messages.into_iter().cloned().collect(),
                current_index,
            },
            None => Siblings::default(),
        }
    }

    /// Move to the previous/next sibling of `message_id` and select the
    /// deepest leaf below it (earliest-created child at each level).
    ///
    /// Stepping past either end leaves the leaf pointer unchanged.
    pub fn switch_to_sibling(
        &mut self,
        chat_id: &str,
        message_id: &str,
        direction: Direction,
    ) -> Result<()> {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return Ok(());
        };

        let leaf_id = {
            let tree = MessageTree::new(&chat.messages);
            let Some((siblings, index)) = tree.siblings(message_id) else {
                return Ok(());
            };

            let target = match direction {
                Direction::Prev => index.checked_sub(1),
                Direction::Next => Some(index + 1).filter(|i| *i < siblings.len()),
            };
            let Some(target) = target else {
                tracing::debug!(message_id, ?direction, "Sibling switch out of range");
                return Ok(());
            };

            tree.deepest_leaf(siblings[target].id.as_str()).to_string()
        };

        tracing::debug!(chat_id, leaf_id = %leaf_id, "Switched branch");
        chat.current_leaf_message_id = Some(leaf_id);
        chat.touch();

        self.save()
    }

    pub fn update_chat_title(&mut self, chat_id: &str, title: &str) -> Result<()> {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return Ok(());
        };

        chat.title = title.to_string();
        chat.touch();

        self.save()
    }

    pub fn delete_chat(&mut self, chat_id: &str) -> Result<()> {
        if self.chats.remove(chat_id).is_none() {
            return Ok(());
        }

        tracing::info!(chat_id, "Deleted chat");
        self.save()
    }

    /// Serialize the whole collection, most recently updated first
    fn save(&self) -> Result<()> {
        let document = serde_json::to_string(&self.all_chats())?;
        self.backend.write(&document)
    }
}

/// Title derived from the first user message: its first six words, with
/// `...` appended when that drops anything
pub fn generate_title(first_message: &str) -> String {
    let words: Vec<&str> = first_message.split_whitespace().take(TITLE_WORDS).collect();
    let title = words.join(" ");

    if title.len() < first_message.len() {
        format!("{}...", title)
    } else {
        title
    }
}
