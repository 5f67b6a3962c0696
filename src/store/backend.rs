//! Persistence backend trait definition
//!
//! The alert store does not talk to any concrete storage directly. It is
//! handed a key-value-slot capability at construction time, which keeps the
//! store testable without a real storage host and portable across hosts.

use async_trait::async_trait;

use super::error::StorageResult;

/// A single durable slot holding the serialized active alert set.
///
/// Implementations must be `Send + Sync` as they are shared across async
/// tasks. Writes are last-writer-wins; there are no merge semantics.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Read the current contents of the slot.
    ///
    /// Returns `Ok(None)` when the slot has never been written. Errors are
    /// absorbed by the store, which then starts from an empty set.
    async fn load(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the contents of the slot.
    async fn save(&self, bytes: &[u8]) -> StorageResult<()>;
}
