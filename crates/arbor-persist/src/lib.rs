pub mod models;
pub mod tree;
pub mod store;
pub mod backends;
pub mod error;

pub use models::{Chat, ChatMessage, MessageRole};
pub use tree::MessageTree;
pub use store::{generate_title, ChatStore, Direction, Siblings, DEFAULT_CHAT_TITLE};
pub use backends::{ChatBackend, JsonFileBackend, MemoryBackend};
pub use error::{PersistError, Result};
