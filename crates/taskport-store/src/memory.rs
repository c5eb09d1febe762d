//! In-memory document and counter store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::document::{Document, Filter, UpsertOutcome, business_id, merge_fields};
use crate::error::StoreError;
use crate::store::{CounterStore, DocumentStore};

/// Process-local store.
///
/// Each collection and each counter lives behind a shard lock, so every operation
/// on a single collection or counter is atomic.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<i64, Document>>,
    counters: DashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    /// Whether a collection is empty or missing.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        id: i64,
        mut document: Document,
    ) -> Result<UpsertOutcome, StoreError> {
        document.insert("id".to_string(), Value::from(id));
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if let Some(stored) = docs.get_mut(&id) {
            let outcome = if merge_fields(stored, &document) {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Unchanged
            };
            return Ok(outcome);
        }
        docs.insert(id, document);
        Ok(UpsertOutcome::Inserted)
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let id = business_id(&document).ok_or_else(|| StoreError::MissingId {
            collection: collection.to_string(),
        })?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id,
            });
        }
        docs.insert(id, document);
        Ok(())
    }

    async fn get(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(&id).cloned()))
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        mut fields: Document,
    ) -> Result<usize, StoreError> {
        fields.remove("id");
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut matched = 0;
        for doc in docs.values_mut().filter(|d| filter.matches(d)) {
            merge_fields(doc, &fields);
            matched += 1;
        }
        Ok(matched)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|_, d| !filter.matches(d));
        Ok(before - docs.len())
    }

    async fn max_id(&self, collection: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.keys().next_back().copied()))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut seq = self.counters.entry(key.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn seed(&self, key: &str, floor: i64) -> Result<i64, StoreError> {
        let mut seq = self.counters.entry(key.to_string()).or_insert(floor);
        if *seq < floor {
            *seq = floor;
        }
        Ok(*seq)
    }

    async fn current(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.counters.get(key).map(|seq| *seq))
    }
}
