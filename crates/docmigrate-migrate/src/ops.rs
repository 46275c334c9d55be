//! Applying field operations to a document's working copy.

use docmigrate_core::{defined_value, is_defined, Fields, Result};
use docmigrate_store::DocumentStore;

use crate::lookup::{LookupCache, LookupMiss};
use crate::preset::{Operation, SourceRemoval};

/// What became of one document after its operations ran.
#[derive(Debug, Clone, PartialEq)]
pub enum DocOutcome {
    /// All operations applied; compare the working copy to decide on a write.
    Ready,
    /// A lookup found nothing; the document is skipped.
    Miss(LookupMiss),
}

/// Apply `operations` in order to `working`. Each operation sees the result
/// of the ones before it.
///
/// Returns `Err` only on cancellation.
pub fn apply_operations<S: DocumentStore + ?Sized>(
    operations: &[Operation],
    working: &mut Fields,
    lookups: &mut LookupCache<'_, S>,
) -> Result<DocOutcome> {
    for op in operations {
        match op {
            Operation::CoalesceToField {
                from,
                to,
                overwrite,
            } => coalesce(working, from, to, *overwrite),
            Operation::RenameField {
                from,
                to,
                overwrite,
                remove_source,
                source_removal,
            } => rename(working, from, to, *overwrite, *remove_source, *source_removal),
            Operation::RemoveFields { fields } => {
                for field in fields {
                    working.remove(field);
                }
            }
            Operation::LookupField {
                key,
                collection,
                by,
                select,
                to,
                overwrite,
            } => {
                if !overwrite && is_defined(working, to) {
                    continue;
                }
                let Some(key_value) = defined_value(working, key).cloned() else {
                    return Ok(DocOutcome::Miss(LookupMiss {
                        collection: collection.clone(),
                        key_field: key.clone(),
                        key: None,
                    }));
                };
                match lookups.resolve(collection, by, select, &key_value)? {
                    Some(value) => {
                        working.insert(to.clone(), value);
                    }
                    None => {
                        return Ok(DocOutcome::Miss(LookupMiss {
                            collection: collection.clone(),
                            key_field: key.clone(),
                            key: Some(key_value),
                        }));
                    }
                }
            }
        }
    }
    Ok(DocOutcome::Ready)
}

fn coalesce(working: &mut Fields, from: &[String], to: &str, overwrite: bool) {
    if !overwrite && is_defined(working, to) {
        return;
    }
    if let Some(value) = from.iter().find_map(|f| defined_value(working, f)).cloned() {
        working.insert(to.to_string(), value);
    }
}

fn rename(
    working: &mut Fields,
    from: &str,
    to: &str,
    overwrite: bool,
    remove_source: bool,
    source_removal: SourceRemoval,
) {
    let source = defined_value(working, from).cloned();
    let mut copied = false;

    if let Some(value) = source {
        if overwrite || !is_defined(working, to) {
            working.insert(to.to_string(), value);
            copied = true;
        } else {
            copied = working.get(to) == Some(&value);
        }
    }

    if remove_source {
        let remove = match source_removal {
            SourceRemoval::Always => true,
            SourceRemoval::WhenCopied => copied,
        };
        if remove {
            working.remove(from);
        }
    }
}
