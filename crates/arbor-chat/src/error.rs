use arbor_persist::PersistError;
use thiserror::Error;

/// Failures surfaced by session actions.
///
/// Streaming failures never appear here: they are absorbed into the
/// session view (`last_error` plus a synthetic reply).
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
