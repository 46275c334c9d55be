//! Batched field-migration executor.
//!
//! Per collection, in declared order: enumerate, apply operations to a
//! working copy of each document, queue a merge write when the copy differs
//! from the original, and flush the queue whenever it reaches the batch
//! limit. Everything runs sequentially on the caller's thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use docmigrate_core::{Error, Result, RunConfig};
use docmigrate_store::{DocRef, DocumentStore, PendingWrite};
use tracing::{debug, error, info, warn};

use crate::lookup::LookupCache;
use crate::ops::{apply_operations, DocOutcome};
use crate::preset::{CollectionSpec, Preset};
use crate::summary::{CollectionSummary, RunSummary};

/// Cooperative cancellation flag, checked before every store call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Per-run knobs that do not belong to the preset itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// Compute and count writes without committing them.
    pub dry_run: bool,
    /// Overrides the preset's batch limit.
    pub batch_limit: Option<usize>,
}

impl From<&RunConfig> for RunOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            batch_limit: config.batch_limit,
        }
    }
}

/// A failed run, with everything that was counted up to the failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunError {
    pub error: Error,
    pub summary: RunSummary,
}

/// Executes presets against a document store.
pub struct Executor<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    options: RunOptions,
    cancel: CancelToken,
}

impl<'a, S: DocumentStore + ?Sized> Executor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            options: RunOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every collection of `preset` in declared order.
    ///
    /// Configuration errors are reported before the store is touched. A
    /// backend failure or cancellation stops the run; the returned summary
    /// covers everything up to that point.
    pub fn run(&self, preset: &Preset) -> std::result::Result<RunSummary, RunError> {
        let start = Instant::now();
        let mut summary = RunSummary::new(&preset.name, self.options.dry_run);

        let batch_limit = self.options.batch_limit.unwrap_or(preset.batch_limit);
        let checked = preset.validate().and_then(|_| {
            if batch_limit == 0 {
                Err(Error::Config("batch limit override must be greater than zero".into()))
            } else {
                Ok(())
            }
        });
        if let Err(error) = checked {
            return Err(RunError { error, summary });
        }

        if batch_limit > self.store.max_batch_size() {
            warn!(
                "Batch limit {} exceeds the store maximum of {}; commits will be rejected",
                batch_limit,
                self.store.max_batch_size()
            );
        }

        info!(
            "Starting preset '{}': {} collections, batch limit {}{}",
            preset.name,
            preset.collections.len(),
            batch_limit,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let mut lookups = LookupCache::new(self.store, self.cancel.clone());

        for spec in &preset.collections {
            let mut stats = CollectionSummary::new(&spec.name);
            let result = self.run_collection(spec, batch_limit, &mut lookups, &mut stats);
            summary.collections.push(stats);

            if let Err(error) = result {
                summary.duration_ms = start.elapsed().as_millis() as u64;
                error!("Preset '{}' aborted in {}: {}", preset.name, spec.name, error);
                return Err(RunError { error, summary });
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        let totals = summary.totals();
        info!(
            "Preset '{}' complete: scanned={}, skipped={}, queued={}, committed={}, batches={}, lookups={} (cached {}), duration={}ms",
            preset.name,
            totals.scanned,
            totals.skipped,
            totals.queued,
            totals.committed,
            totals.batches,
            lookups.queries(),
            lookups.hits(),
            summary.duration_ms
        );
        Ok(summary)
    }

    fn run_collection(
        &self,
        spec: &CollectionSpec,
        batch_limit: usize,
        lookups: &mut LookupCache<'_, S>,
        stats: &mut CollectionSummary,
    ) -> Result<()> {
        self.cancel.check()?;
        let docs = self.store.list(&spec.name, &spec.query())?;
        debug!("{}: {} documents to scan", spec.name, docs.len());

        let mut pending: Vec<PendingWrite> = Vec::with_capacity(batch_limit.min(docs.len()));

        for doc in docs {
            self.cancel.check()?;
            stats.scanned += 1;

            let mut working = doc.fields.clone();
            if let DocOutcome::Miss(miss) = apply_operations(&spec.operations, &mut working, lookups)? {
                debug!("{}/{}: skipped, {}", spec.name, doc.id, miss);
                stats.skipped += 1;
                stats.lookup_misses += 1;
                continue;
            }

            match PendingWrite::diff(DocRef::new(&spec.name, &doc.id), &doc.fields, &working) {
                Some(write) => {
                    pending.push(write);
                    stats.queued += 1;
                    if pending.len() >= batch_limit {
                        self.flush(&mut pending, stats)?;
                    }
                }
                None => stats.skipped += 1,
            }
        }

        self.flush(&mut pending, stats)?;

        info!(
            "{}: scanned={}, skipped={}, queued={}, batches={}",
            spec.name, stats.scanned, stats.skipped, stats.queued, stats.batches
        );
        Ok(())
    }

    /// Commit the queue as one atomic batch and clear it.
    fn flush(&self, pending: &mut Vec<PendingWrite>, stats: &mut CollectionSummary) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        self.cancel.check()?;

        if self.options.dry_run {
            debug!("{}: dry run, {} writes not committed", stats.collection, pending.len());
            pending.clear();
            return Ok(());
        }

        let size = pending.len();
        self.store.commit(pending).map_err(|e| match e {
            Error::BatchRejected { .. } => e,
            other => Error::BatchRejected {
                lost: size,
                reason: other.to_string(),
            },
        })?;

        stats.committed += size;
        stats.batches += 1;
        debug!("{}: committed batch of {}", stats.collection, size);
        pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::Operation;
    use docmigrate_store::{DocumentSnapshot, ListQuery, MemoryStore};
    use serde_json::json;

    fn seed(store: &MemoryStore, collection: &str, n: usize) {
        for i in 0..n {
            store.insert(
                collection,
                &format!("d{:04}", i),
                json!({"uid": format!("u{}", i)}).as_object().cloned().unwrap(),
            );
        }
    }

    fn owner_preset(batch_limit: usize) -> Preset {
        Preset::new(
            "owners",
            batch_limit,
            vec![CollectionSpec::new(
                "quizzes",
                vec![Operation::coalesce(&["ownerId", "uid"], "ownerId", false)],
            )],
        )
    }

    #[test]
    fn test_batches_split_at_limit() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 7);

        let summary = Executor::new(&store).run(&owner_preset(3)).unwrap();
        assert_eq!(store.commit_sizes(), vec![3, 3, 1]);
        let totals = summary.totals();
        assert_eq!(totals.scanned, 7);
        assert_eq!(totals.queued, 7);
        assert_eq!(totals.committed, 7);
        assert_eq!(totals.batches, 3);
    }

    #[test]
    fn test_exact_multiple_issues_no_empty_batch() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 6);

        let summary = Executor::new(&store).run(&owner_preset(3)).unwrap();
        assert_eq!(store.commit_sizes(), vec![3, 3]);
        assert_eq!(summary.totals().batches, 2);
    }

    #[test]
    fn test_batch_limit_override() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 5);

        let options = RunOptions {
            batch_limit: Some(2),
            ..Default::default()
        };
        Executor::new(&store).with_options(options).run(&owner_preset(400)).unwrap();
        assert_eq!(store.commit_sizes(), vec![2, 2, 1]);
    }

    #[test]
    fn test_dry_run_commits_nothing() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 4);

        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = Executor::new(&store).with_options(options).run(&owner_preset(3)).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.totals().queued, 4);
        assert_eq!(summary.totals().committed, 0);
        assert_eq!(summary.totals().batches, 0);
        assert!(store.commit_sizes().is_empty());
        assert!(store.fields("quizzes", "d0000").unwrap().get("ownerId").is_none());
    }

    #[test]
    fn test_config_error_before_any_io() {
        let store = MemoryStore::new();
        let preset = Preset::new("empty", 400, vec![]);

        let err = Executor::new(&store).run(&preset).unwrap_err();
        assert!(matches!(err.error, Error::Config(_)));
        assert!(err.summary.collections.is_empty());
        assert_eq!(store.list_calls(), 0);
    }

    #[test]
    fn test_rejected_commit_reports_lost_writes_and_partial_summary() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 5);
        seed(&store, "topics", 2);
        store.reject_commit_at(1);

        let mut preset = owner_preset(2);
        preset.collections.push(CollectionSpec::new(
            "topics",
            vec![Operation::remove(&["uid"])],
        ));

        let err = Executor::new(&store).run(&preset).unwrap_err();
        assert!(matches!(err.error, Error::BatchRejected { lost: 2, .. }));
        // topics never started
        assert_eq!(err.summary.collections.len(), 1);
        let quizzes = &err.summary.collections[0];
        assert_eq!(quizzes.committed, 2);
        assert_eq!(quizzes.batches, 1);
        assert_eq!(quizzes.queued, 4);
        assert_eq!(store.commit_sizes(), vec![2]);
        assert!(store.fields("topics", "d0000").unwrap().contains_key("uid"));
    }

    #[test]
    fn test_unreachable_store_is_backend_error() {
        let store = MemoryStore::new();
        store.set_unreachable(true);

        let err = Executor::new(&store).run(&owner_preset(400)).unwrap_err();
        assert!(err.error.is_backend());
        assert_eq!(err.summary.totals().scanned, 0);
    }

    #[test]
    fn test_oversized_batch_rejected_by_store() {
        let store = MemoryStore::with_max_batch_size(2);
        seed(&store, "quizzes", 3);

        let err = Executor::new(&store).run(&owner_preset(3)).unwrap_err();
        assert!(matches!(err.error, Error::BatchRejected { lost: 3, .. }));
        assert_eq!(err.summary.totals().committed, 0);
    }

    #[test]
    fn test_cancelled_run_stops_before_store_calls() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 3);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = Executor::new(&store)
            .with_cancel(cancel)
            .run(&owner_preset(400))
            .unwrap_err();
        assert!(matches!(err.error, Error::Cancelled));
        assert_eq!(store.list_calls(), 0);
        assert!(store.commit_sizes().is_empty());
    }

    /// Cancels the run as soon as the wrapped store accepts a batch.
    struct CancelOnCommit<'a> {
        inner: &'a MemoryStore,
        cancel: CancelToken,
    }

    impl DocumentStore for CancelOnCommit<'_> {
        fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<DocumentSnapshot>> {
            self.inner.list(collection, query)
        }

        fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>> {
            self.inner.get(collection, id)
        }

        fn commit(&self, batch: &[PendingWrite]) -> Result<()> {
            self.inner.commit(batch)?;
            self.cancel.cancel();
            Ok(())
        }
    }

    #[test]
    fn test_cancel_between_batches_keeps_committed_work() {
        let store = MemoryStore::new();
        seed(&store, "quizzes", 7);
        seed(&store, "topics", 2);
        let cancel = CancelToken::new();
        let wrapped = CancelOnCommit {
            inner: &store,
            cancel: cancel.clone(),
        };

        let mut preset = owner_preset(3);
        preset.collections.push(CollectionSpec::new(
            "topics",
            vec![Operation::remove(&["uid"])],
        ));

        let err = Executor::new(&wrapped)
            .with_cancel(cancel)
            .run(&preset)
            .unwrap_err();
        assert!(matches!(err.error, Error::Cancelled));
        assert_eq!(store.commit_sizes(), vec![3]);

        assert_eq!(err.summary.collections.len(), 1);
        let quizzes = &err.summary.collections[0];
        assert_eq!(quizzes.committed, 3);
        assert_eq!(quizzes.batches, 1);
        assert_eq!(quizzes.queued, 3);
        assert_eq!(quizzes.scanned, 3);

        assert_eq!(store.fields("quizzes", "d0002").unwrap()["ownerId"], json!("u2"));
        assert!(store.fields("quizzes", "d0003").unwrap().get("ownerId").is_none());
        assert!(store.fields("topics", "d0000").unwrap().contains_key("uid"));
    }

    #[test]
    fn test_run_options_from_config() {
        let config = RunConfig {
            dry_run: true,
            batch_limit: Some(50),
            ..Default::default()
        };
        let options = RunOptions::from(&config);
        assert!(options.dry_run);
        assert_eq!(options.batch_limit, Some(50));
    }
}
