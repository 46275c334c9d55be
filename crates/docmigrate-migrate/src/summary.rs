//! Run summary counters and the plain-text report.

use std::fmt::Write;

use serde::Serialize;

/// Counters for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub collection: String,
    /// Documents read from the store.
    pub scanned: usize,
    /// Documents that needed no write, including lookup misses.
    pub skipped: usize,
    /// Writes appended to the batch queue.
    pub queued: usize,
    /// Writes in batches the store accepted.
    pub committed: usize,
    /// Non-empty batch commits issued.
    pub batches: usize,
    /// Documents skipped because a lookup found nothing.
    pub lookup_misses: usize,
}

impl CollectionSummary {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    fn add(&mut self, other: &CollectionSummary) {
        self.scanned += other.scanned;
        self.skipped += other.skipped;
        self.queued += other.queued;
        self.committed += other.committed;
        self.batches += other.batches;
        self.lookup_misses += other.lookup_misses;
    }
}

/// Result of running one preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub preset: String,
    pub dry_run: bool,
    pub collections: Vec<CollectionSummary>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(preset: impl Into<String>, dry_run: bool) -> Self {
        Self {
            preset: preset.into(),
            dry_run,
            ..Default::default()
        }
    }

    /// Sum of all collection counters.
    pub fn totals(&self) -> CollectionSummary {
        let mut totals = CollectionSummary::new("TOTAL");
        for c in &self.collections {
            totals.add(c);
        }
        totals
    }

    /// Render the collection-by-collection report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== DocMigrate Run Summary: {} ===", self.preset);
        let _ = writeln!(out);

        let width = self
            .collections
            .iter()
            .map(|c| c.collection.len())
            .chain(std::iter::once("Collection".len()))
            .max()
            .unwrap_or(10);

        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:>8}  {:>8}  {:>9}  {:>7}  {:>13}",
            "Collection", "Scanned", "Skipped", "Queued", "Committed", "Batches", "Lookup misses",
            width = width
        );
        let totals = self.totals();
        for c in self.collections.iter().chain(std::iter::once(&totals)) {
            let _ = writeln!(
                out,
                "{:<width$}  {:>8}  {:>8}  {:>8}  {:>9}  {:>7}  {:>13}",
                c.collection,
                c.scanned,
                c.skipped,
                c.queued,
                c.committed,
                c.batches,
                c.lookup_misses,
                width = width
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Duration:           {} ms", self.duration_ms);
        if self.dry_run {
            let _ = writeln!(out, "Mode:               DRY RUN (nothing committed)");
        }
        out
    }
}
