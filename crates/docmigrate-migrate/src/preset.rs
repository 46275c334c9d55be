//! Preset, collection and operation descriptors.

use docmigrate_core::{Error, Result};
use docmigrate_store::{Filter, ListQuery, Order};
use serde::{Deserialize, Serialize};

/// Batch limit used when a preset does not name one.
pub const DEFAULT_BATCH_LIMIT: usize = 400;

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

/// A named, reusable migration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Preset {
    pub name: String,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    pub collections: Vec<CollectionSpec>,
}

/// Operations to apply to every document of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectionSpec {
    pub name: String,
    /// First-N cap on enumeration, in `order`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub order: Order,
    pub operations: Vec<Operation>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            name: name.into(),
            limit: None,
            filter: None,
            order: Order::Default,
            operations,
        }
    }

    pub(crate) fn query(&self) -> ListQuery {
        ListQuery {
            filter: self.filter.clone(),
            limit: self.limit,
            order: self.order,
        }
    }
}

/// When `renameField` with `removeSource` deletes the source field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceRemoval {
    /// Remove the source even when the copy was skipped because the
    /// destination was already set.
    #[default]
    Always,
    /// Remove the source only once the destination holds its value.
    WhenCopied,
}

/// How a lookup finds the related document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LookupBy {
    /// The key is the related document's id.
    #[default]
    DocumentId,
    /// The key equals this field of the related document.
    Field(String),
}

/// What a lookup copies out of the related document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selector {
    #[default]
    DocumentId,
    Field(String),
}

/// One field operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", deny_unknown_fields)]
pub enum Operation {
    /// Set `to` to the first defined candidate in `from`.
    #[serde(rename_all = "camelCase")]
    CoalesceToField {
        from: Vec<String>,
        to: String,
        #[serde(default)]
        overwrite: bool,
    },
    /// Copy `from` into `to`, optionally deleting `from`.
    #[serde(rename_all = "camelCase")]
    RenameField {
        from: String,
        to: String,
        #[serde(default)]
        overwrite: bool,
        #[serde(default)]
        remove_source: bool,
        #[serde(default)]
        source_removal: SourceRemoval,
    },
    /// Delete fields unconditionally.
    #[serde(rename_all = "camelCase")]
    RemoveFields { fields: Vec<String> },
    /// Resolve a value through another collection, keyed by `key`.
    #[serde(rename_all = "camelCase")]
    LookupField {
        key: String,
        collection: String,
        #[serde(default)]
        by: LookupBy,
        #[serde(default)]
        select: Selector,
        to: String,
        #[serde(default)]
        overwrite: bool,
    },
}

impl Operation {
    pub fn coalesce(from: &[&str], to: &str, overwrite: bool) -> Self {
        Operation::CoalesceToField {
            from: from.iter().map(|f| f.to_string()).collect(),
            to: to.to_string(),
            overwrite,
        }
    }

    pub fn rename(from: &str, to: &str, overwrite: bool, remove_source: bool) -> Self {
        Operation::RenameField {
            from: from.to_string(),
            to: to.to_string(),
            overwrite,
            remove_source,
            source_removal: SourceRemoval::Always,
        }
    }

    pub fn remove(fields: &[&str]) -> Self {
        Operation::RemoveFields {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Short name used in logs and validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CoalesceToField { .. } => "coalesceToField",
            Operation::RenameField { .. } => "renameField",
            Operation::RemoveFields { .. } => "removeFields",
            Operation::LookupField { .. } => "lookupField",
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Operation::CoalesceToField { from, to, .. } => {
                if from.is_empty() {
                    return Err("empty 'from' candidate list".into());
                }
                check_names(from.iter().chain(std::iter::once(to)))
            }
            Operation::RenameField { from, to, .. } => {
                check_names([from, to])?;
                if from == to {
                    return Err(format!("source and destination are both '{}'", from));
                }
                Ok(())
            }
            Operation::RemoveFields { fields } => {
                if fields.is_empty() {
                    return Err("empty field list".into());
                }
                check_names(fields)
            }
            Operation::LookupField {
                key,
                collection,
                by,
                select,
                to,
                ..
            } => {
                if collection.trim().is_empty() {
                    return Err("empty lookup collection".into());
                }
                check_names([key, to])?;
                if let LookupBy::Field(f) = by {
                    check_names([f])?;
                }
                if let Selector::Field(f) = select {
                    check_names([f])?;
                }
                Ok(())
            }
        }
    }
}

fn check_names<'a>(names: impl IntoIterator<Item = &'a String>) -> std::result::Result<(), String> {
    if names.into_iter().any(|n| n.trim().is_empty()) {
        return Err("empty field name".into());
    }
    Ok(())
}

impl Preset {
    pub fn new(name: impl Into<String>, batch_limit: usize, collections: Vec<CollectionSpec>) -> Self {
        Self {
            name: name.into(),
            batch_limit,
            collections,
        }
    }

    /// Parse a preset from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("Invalid preset JSON: {}", e)))
    }

    /// Reject malformed presets before any store access.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("preset name is empty".into()));
        }
        if self.batch_limit == 0 {
            return Err(Error::Config(format!(
                "preset '{}': batchLimit must be greater than zero",
                self.name
            )));
        }
        if self.collections.is_empty() {
            return Err(Error::Config(format!(
                "preset '{}' has no collections",
                self.name
            )));
        }

        for (ci, spec) in self.collections.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(Error::Config(format!(
                    "preset '{}': collection #{} has an empty name",
                    self.name, ci
                )));
            }
            if spec.limit == Some(0) {
                return Err(Error::Config(format!(
                    "preset '{}': collection '{}' has limit 0",
                    self.name, spec.name
                )));
            }
            if let Some(filter) = &spec.filter {
                if filter.field.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "preset '{}': collection '{}' filters on an empty field name",
                        self.name, spec.name
                    )));
                }
            }
            for (oi, op) in spec.operations.iter().enumerate() {
                op.validate().map_err(|reason| {
                    Error::Config(format!(
                        "preset '{}': {}[{}] {}: {}",
                        self.name,
                        spec.name,
                        oi,
                        op.kind(),
                        reason
                    ))
                })?;
            }
        }
        Ok(())
    }
}
