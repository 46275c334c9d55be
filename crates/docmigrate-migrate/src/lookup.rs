//! Cross-collection lookups with a per-run memo cache.
//!
//! Lookups are pure for the duration of a run: the same (collection, by,
//! select, key) always resolves to the same value, so each distinct key hits
//! the store once. Store failures during a lookup are treated as "no
//! derivable value" and are not cached.

use std::collections::HashMap;
use std::fmt;

use docmigrate_core::{defined_value, Result, Value};
use docmigrate_store::{DocumentStore, DocumentSnapshot, Filter, ListQuery};
use tracing::{debug, warn};

use crate::executor::CancelToken;
use crate::preset::{LookupBy, Selector};

/// A value that could not be resolved. Never escalates past the document.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupMiss {
    pub collection: String,
    pub key_field: String,
    pub key: Option<Value>,
}

impl fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "no match in {} for {}={}", self.collection, self.key_field, key),
            None => write!(f, "{} is not set", self.key_field),
        }
    }
}

/// Memoizing resolver over a document store.
pub struct LookupCache<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    cancel: CancelToken,
    cache: HashMap<String, Option<Value>>,
    hits: usize,
    queries: usize,
}

impl<'s, S: DocumentStore + ?Sized> LookupCache<'s, S> {
    pub fn new(store: &'s S, cancel: CancelToken) -> Self {
        Self {
            store,
            cancel,
            cache: HashMap::new(),
            hits: 0,
            queries: 0,
        }
    }

    /// Resolve `key` against `collection`.
    ///
    /// Only cancellation is an error; every other failure is `Ok(None)`.
    pub fn resolve(
        &mut self,
        collection: &str,
        by: &LookupBy,
        select: &Selector,
        key: &Value,
    ) -> Result<Option<Value>> {
        let cache_key = format!("{}\u{1f}{:?}\u{1f}{:?}\u{1f}{}", collection, by, select, key);
        if let Some(cached) = self.cache.get(&cache_key) {
            self.hits += 1;
            return Ok(cached.clone());
        }

        self.cancel.check()?;
        self.queries += 1;

        let related = match self.fetch(collection, by, key) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Lookup in {} for {} failed: {}", collection, key, e);
                return Ok(None);
            }
        };

        let value = related.and_then(|doc| match select {
            Selector::DocumentId => Some(Value::String(doc.id)),
            Selector::Field(field) => defined_value(&doc.fields, field).cloned(),
        });
        debug!("Lookup {} {} -> {:?}", collection, key, value);
        self.cache.insert(cache_key, value.clone());
        Ok(value)
    }

    fn fetch(&self, collection: &str, by: &LookupBy, key: &Value) -> Result<Option<DocumentSnapshot>> {
        match by {
            LookupBy::DocumentId => match key {
                Value::String(id) => self.store.get(collection, id),
                _ => Ok(None),
            },
            LookupBy::Field(field) => {
                let query = ListQuery {
                    filter: Some(Filter::equals(field.clone(), key.clone())),
                    limit: Some(1),
                    ..Default::default()
                };
                Ok(self.store.list(collection, &query)?.into_iter().next())
            }
        }
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Lookups that went to the store.
    pub fn queries(&self) -> usize {
        self.queries
    }
}
