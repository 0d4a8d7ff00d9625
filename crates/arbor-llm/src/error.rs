use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider is not usable as configured (e.g. missing API key).
    /// Raised before any request is sent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider API error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;
