//! DocMigrate Store: the document store collaborator.
//!
//! A store exposes collection enumeration (with an optional filter, order and
//! count cap), single-document fetch, and atomic batched merge writes.

pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::*;

use docmigrate_core::Result;

/// Default upper bound on writes per atomic commit.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Trait for document store backends.
pub trait DocumentStore: Send + Sync {
    /// Enumerate documents in a collection.
    fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<DocumentSnapshot>>;

    /// Fetch a single document by id.
    fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>>;

    /// Apply a batch of merge writes atomically: all entries or none.
    fn commit(&self, batch: &[PendingWrite]) -> Result<()>;

    /// Largest batch `commit` accepts.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}
