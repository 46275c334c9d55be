//! Batched field migrations: presets, operations, executor.
//!
//! A preset names an ordered list of collections and, per collection, an
//! ordered list of field operations. The executor scans each collection,
//! applies the operations to an in-memory copy of every document and
//! commits the resulting merge writes in bounded batches.

pub mod catalog;
pub mod executor;
pub mod lookup;
pub mod ops;
pub mod preset;
pub mod summary;

pub use catalog::{builtin, builtin_names, resolve_preset};
pub use executor::{CancelToken, Executor, RunError, RunOptions};
pub use lookup::{LookupCache, LookupMiss};
pub use preset::*;
pub use summary::{CollectionSummary, RunSummary};
