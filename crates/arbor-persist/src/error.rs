use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message {message_id} references parent {parent_id} which is not in chat {chat_id}")]
    DanglingParent {
        chat_id: String,
        message_id: String,
        parent_id: String,
    },

    #[error("Message {message_id} already exists in chat {chat_id}")]
    DuplicateMessage {
        chat_id: String,
        message_id: String,
    },

    #[error("Storage path unavailable: {0}")]
    Path(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;
