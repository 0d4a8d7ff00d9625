use std::sync::{Arc, Mutex};

use super::ChatBackend;
use crate::error::Result;

/// In-memory backend (for testing or throwaway sessions)
///
/// Clones share the same document, so a test can keep a handle and inspect
/// what the store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    document: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing serialized collection
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Arc::new(Mutex::new(Some(document.into()))),
        }
    }

    pub fn document(&self) -> Option<String> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ChatBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.document())
    }

    fn write(&self, document: &str) -> Result<()> {
        let mut guard = self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(document.to_string());
        Ok(())
    }
}
