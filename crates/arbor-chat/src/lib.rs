pub mod aggregator;
pub mod error;
pub mod reconcile;
pub mod session;

pub use aggregator::{StreamAggregator, StreamObserver, StreamOutcome};
pub use error::{Result, SessionError};
pub use reconcile::reconcile;
pub use session::{ChatSession, EditDraft, SessionState, SessionView, StopHandle, ERROR_REPLY_PREFIX};

// Re-export the pieces callers need to drive a session
pub use arbor_persist::{ChatMessage, ChatStore, Direction, MessageRole};
pub use tokio_util::sync::CancellationToken;
