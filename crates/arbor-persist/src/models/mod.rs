mod chat;
mod message;

pub use chat::Chat;
pub use message::{ChatMessage, MessageRole};
