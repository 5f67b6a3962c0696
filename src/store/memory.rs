//! In-memory persistence backend (no durability)
//!
//! Holds the slot contents in a shared buffer. Useful for running without a
//! storage path configured and for tests: clones share the same slot, so a
//! store opened on a clone sees what a previous store saved.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::backend::PersistenceBackend;
use super::error::StorageResult;

/// In-memory slot backend
#[derive(Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the slot, mimicking a previous session's write.
    pub fn with_contents(bytes: Vec<u8>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(bytes))),
        }
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.slot.lock().expect("slot lock poisoned").clone())
    }

    async fn save(&self, bytes: &[u8]) -> StorageResult<()> {
        *self.slot.lock().expect("slot lock poisoned") = Some(bytes.to_vec());
        Ok(())
    }
}
