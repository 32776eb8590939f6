//! Seen-set persistence.
//!
//! The seen set is the idempotency boundary across restarts: an id is marked
//! before its listing is handed to the notification sink, and the whole set
//! is flushed after any batch that leaves it dirty.

pub mod local;

use async_trait::async_trait;

// Re-export for convenience
pub use local::SeenSetStore;

/// Trait for seen-set backends.
///
/// The in-memory view is authoritative for the life of the process; `flush`
/// failures are reported but never roll back marks.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether `id` was already delivered.
    fn contains(&self, id: &str) -> bool;

    /// Add `id` to the in-memory set. Returns false if it was already present.
    fn mark(&mut self, id: &str) -> bool;

    /// Number of ids in the set.
    fn len(&self) -> usize;

    /// Whether the set is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether marks exist that have not been durably persisted.
    fn is_dirty(&self) -> bool;

    /// Durably persist the full set. Errors are logged; returns success.
    async fn flush(&mut self) -> bool;
}
