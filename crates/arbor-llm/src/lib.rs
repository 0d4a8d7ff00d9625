pub mod types;
pub mod traits;
pub mod streaming;
pub mod buffer_utils;
pub mod config;
pub mod error;
pub mod openai;

pub use traits::{ChatClient, ChatRequest, ChatOptions, EventStream};
pub use streaming::StreamEvent;
pub use buffer_utils::CircularLineBuffer;
pub use config::OpenAIConfig;
pub use error::{LlmError, Result};
pub use openai::OpenAIClient;
pub use types::Message;
