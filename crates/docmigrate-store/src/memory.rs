//! In-process document store.
//!
//! Keeps documents in insertion order per collection and records every call
//! the executor makes, so runs can be inspected after the fact. Failure
//! injection covers the two backend failures a run must survive reporting:
//! an unreachable store and a rejected commit.

use std::collections::HashMap;

use docmigrate_core::{Error, Fields, Result};
use parking_lot::Mutex;
use tracing::debug;

use crate::types::*;
use crate::{DocumentStore, DEFAULT_MAX_BATCH_SIZE};

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Vec<DocumentSnapshot>>,
    next_seq: i64,
    /// Size of every successful commit, in order.
    commits: Vec<usize>,
    list_calls: usize,
    get_calls: usize,
    unreachable: bool,
    /// Reject the commit with this zero-based index.
    reject_commit: Option<usize>,
    commit_attempts: usize,
}

/// Thread-safe in-memory store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_batch_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_batch_size,
        }
    }

    /// Insert or replace a document. New documents go to the end of the
    /// collection's native order.
    pub fn insert(&self, collection: &str, id: &str, fields: Fields) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let seq = inner.next_seq;
        let docs = inner.collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.fields = fields,
            None => {
                docs.push(DocumentSnapshot {
                    id: id.to_string(),
                    fields,
                    created_at: seq,
                });
                inner.next_seq += 1;
            }
        }
    }

    /// Current fields of a document, bypassing call accounting.
    pub fn fields(&self, collection: &str, id: &str) -> Option<Fields> {
        let inner = self.inner.lock();
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .map(|d| d.fields.clone())
    }

    /// Sizes of all successful commits.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.inner.lock().commits.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.inner.lock().list_calls
    }

    pub fn get_calls(&self) -> usize {
        self.inner.lock().get_calls
    }

    /// Make every subsequent call fail as if the backend were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    /// Reject the commit attempt with the given zero-based index.
    pub fn reject_commit_at(&self, attempt: usize) {
        self.inner.lock().reject_commit = Some(attempt);
    }

    fn check_reachable(inner: &Inner) -> Result<()> {
        if inner.unreachable {
            return Err(Error::Backend("store unreachable".into()));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<DocumentSnapshot>> {
        let mut inner = self.inner.lock();
        Self::check_reachable(&inner)?;
        inner.list_calls += 1;
        let docs = inner.collections.get(collection).cloned().unwrap_or_default();
        Ok(query.apply(docs))
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>> {
        let mut inner = self.inner.lock();
        Self::check_reachable(&inner)?;
        inner.get_calls += 1;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    fn commit(&self, batch: &[PendingWrite]) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        Self::check_reachable(inner)?;

        let attempt = inner.commit_attempts;
        inner.commit_attempts += 1;

        if batch.len() > self.max_batch_size {
            return Err(Error::BatchRejected {
                lost: batch.len(),
                reason: format!(
                    "batch of {} exceeds maximum of {}",
                    batch.len(),
                    self.max_batch_size
                ),
            });
        }
        if inner.reject_commit == Some(attempt) {
            return Err(Error::BatchRejected {
                lost: batch.len(),
                reason: "permission denied".into(),
            });
        }

        for write in batch {
            let seq = inner.next_seq;
            let docs = inner
                .collections
                .entry(write.reference.collection.clone())
                .or_default();
            match docs.iter_mut().find(|d| d.id == write.reference.id) {
                Some(doc) => write.apply_to(&mut doc.fields),
                None => {
                    let mut fields = Fields::new();
                    write.apply_to(&mut fields);
                    docs.push(DocumentSnapshot {
                        id: write.reference.id.clone(),
                        fields,
                        created_at: seq,
                    });
                    inner.next_seq += 1;
                }
            }
        }
        inner.commits.push(batch.len());
        debug!("MemoryStore committed batch of {}", batch.len());
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn fields(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn set(collection: &str, id: &str, key: &str, value: serde_json::Value) -> PendingWrite {
        let mut patch = BTreeMap::new();
        patch.insert(key.to_string(), FieldPatch::Set(value));
        PendingWrite {
            reference: DocRef::new(collection, id),
            patch,
        }
    }

    #[test]
    fn test_insert_and_list_in_insertion_order() {
        let store = MemoryStore::new();
        store.insert("quizzes", "q2", fields(json!({"n": 2})));
        store.insert("quizzes", "q1", fields(json!({"n": 1})));

        let docs = store.list("quizzes", &ListQuery::default()).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["q2", "q1"]);
        assert!(store.list("empty", &ListQuery::default()).unwrap().is_empty());
        assert_eq!(store.list_calls(), 2);
    }

    #[test]
    fn test_commit_merges_and_creates() {
        let store = MemoryStore::new();
        store.insert("quizzes", "q1", fields(json!({"title": "Cells"})));

        store
            .commit(&[
                set("quizzes", "q1", "ownerId", json!("u1")),
                set("quizzes", "q9", "ownerId", json!("u2")),
            ])
            .unwrap();

        assert_eq!(
            store.fields("quizzes", "q1").unwrap(),
            fields(json!({"title": "Cells", "ownerId": "u1"}))
        );
        assert_eq!(
            store.fields("quizzes", "q9").unwrap(),
            fields(json!({"ownerId": "u2"}))
        );
        assert_eq!(store.commit_sizes(), vec![2]);
    }

    #[test]
    fn test_oversized_batch_rejected_atomically() {
        let store = MemoryStore::with_max_batch_size(1);
        store.insert("quizzes", "q1", fields(json!({})));

        let result = store.commit(&[
            set("quizzes", "q1", "a", json!(1)),
            set("quizzes", "q1", "b", json!(2)),
        ]);
        assert!(matches!(result, Err(Error::BatchRejected { lost: 2, .. })));
        assert!(store.fields("quizzes", "q1").unwrap().is_empty());
        assert!(store.commit_sizes().is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryStore::new();
        store.reject_commit_at(1);
        store.commit(&[set("c", "1", "a", json!(1))]).unwrap();
        assert!(store.commit(&[set("c", "2", "a", json!(1))]).is_err());
        assert!(store.fields("c", "2").is_none());

        store.set_unreachable(true);
        assert!(matches!(
            store.get("c", "1"),
            Err(Error::Backend(_))
        ));
    }
}
