//! Data types for document references, queries and batched writes.

use std::collections::BTreeMap;
use std::fmt;

use docmigrate_core::{Fields, Value};
use serde::{Deserialize, Serialize};

/// Address of one document: collection name plus document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: String,
    pub fields: Fields,
    /// Creation time in ms (or insertion sequence for in-memory stores).
    pub created_at: i64,
}

/// Enumeration filter on a single field.
///
/// Written as `{"field": "tags", "arrayContains": "math"}`: the field name
/// plus exactly one operator key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterRepr", into = "FilterRepr")]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals the value.
    Eq(Value),
    /// Field is an array containing the value.
    ArrayContains(Value),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FilterRepr {
    field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eq: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array_contains: Option<Value>,
}

impl TryFrom<FilterRepr> for Filter {
    type Error = String;

    fn try_from(repr: FilterRepr) -> Result<Self, Self::Error> {
        let op = match (repr.eq, repr.array_contains) {
            (Some(value), None) => FilterOp::Eq(value),
            (None, Some(value)) => FilterOp::ArrayContains(value),
            (None, None) => {
                return Err(format!(
                    "filter on '{}' needs one of `eq` or `arrayContains` (null is not a filter value)",
                    repr.field
                ))
            }
            (Some(_), Some(_)) => {
                return Err(format!(
                    "filter on '{}' sets both `eq` and `arrayContains`",
                    repr.field
                ))
            }
        };
        Ok(Filter {
            field: repr.field,
            op,
        })
    }
}

impl From<Filter> for FilterRepr {
    fn from(filter: Filter) -> Self {
        let (eq, array_contains) = match filter.op {
            FilterOp::Eq(value) => (Some(value), None),
            FilterOp::ArrayContains(value) => (None, Some(value)),
        };
        FilterRepr {
            field: filter.field,
            eq,
            array_contains,
        }
    }
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq(value.into()),
        }
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::ArrayContains(value.into()),
        }
    }

    /// Whether a document's fields satisfy this filter.
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match &self.op {
            FilterOp::Eq(expected) => actual == expected,
            FilterOp::ArrayContains(expected) => actual
                .as_array()
                .map(|items| items.contains(expected))
                .unwrap_or(false),
        }
    }
}

/// Enumeration order. `Default` is whatever the store yields natively
/// (insertion order for both bundled stores); it carries no stability
/// guarantee across stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Order {
    #[default]
    Default,
    CreatedAt,
    DocumentId,
}

/// Parameters for collection enumeration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
    pub order: Order,
}

impl ListQuery {
    /// Filter, order and cap a store-native sequence of documents.
    pub fn apply(&self, docs: Vec<DocumentSnapshot>) -> Vec<DocumentSnapshot> {
        let mut docs: Vec<DocumentSnapshot> = match &self.filter {
            Some(filter) => docs.into_iter().filter(|d| filter.matches(&d.fields)).collect(),
            None => docs,
        };
        match self.order {
            Order::Default => {}
            // stable sort keeps native order among equal timestamps
            Order::CreatedAt => docs.sort_by_key(|d| d.created_at),
            Order::DocumentId => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// One field change inside a merge write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldPatch {
    Set(Value),
    Delete,
}

/// A merge write: touches only the listed fields, leaves all others intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub reference: DocRef,
    pub patch: BTreeMap<String, FieldPatch>,
}

impl PendingWrite {
    /// Build the minimal merge patch turning `before` into `after`.
    ///
    /// Returns None when the two field bags are identical.
    pub fn diff(reference: DocRef, before: &Fields, after: &Fields) -> Option<Self> {
        let mut patch = BTreeMap::new();
        for (key, value) in after {
            if before.get(key) != Some(value) {
                patch.insert(key.clone(), FieldPatch::Set(value.clone()));
            }
        }
        for key in before.keys() {
            if !after.contains_key(key) {
                patch.insert(key.clone(), FieldPatch::Delete);
            }
        }
        if patch.is_empty() {
            None
        } else {
            Some(Self { reference, patch })
        }
    }

    /// Merge this write into an existing field bag.
    pub fn apply_to(&self, fields: &mut Fields) {
        for (key, change) in &self.patch {
            match change {
                FieldPatch::Set(value) => {
                    fields.insert(key.clone(), value.clone());
                }
                FieldPatch::Delete => {
                    fields.remove(key);
                }
            }
        }
    }
}
