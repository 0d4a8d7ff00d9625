//! Storage backends for the chat collection.
//!
//! A backend only moves one serialized document in and out; the store owns
//! the schema and rewrites the whole collection on every mutation.

mod json_file;
mod memory;

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;

use crate::error::Result;

pub trait ChatBackend: Send + Sync {
    /// Read the stored document, `None` if nothing was written yet
    fn read(&self) -> Result<Option<String>>;

    /// Replace the stored document
    fn write(&self, document: &str) -> Result<()>;
}
