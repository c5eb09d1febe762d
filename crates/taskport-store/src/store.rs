//! Store traits implemented by every backend.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::document::{Document, Filter, UpsertOutcome};
use crate::error::StoreError;

/// Collections of sparse documents keyed by business id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merge `document` into the document with business id `id`, creating it if absent.
    ///
    /// The stored document always carries `id`. Fields already stored but absent
    /// from `document` are left untouched.
    async fn upsert(
        &self,
        collection: &str,
        id: i64,
        document: Document,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Insert a new document. Fails with [`StoreError::Duplicate`] if the id is taken.
    async fn insert(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    /// Fetch one document by business id.
    async fn get(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError>;

    /// All documents matching `filter`, ascending by business id.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Merge `fields` into every matching document. Returns the number matched.
    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<usize, StoreError>;

    /// Delete every matching document. Returns the number deleted.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError>;

    /// Highest business id stored in the collection.
    async fn max_id(&self, collection: &str) -> Result<Option<i64>, StoreError>;
}

/// Named sequence counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to the counter and return the new value.
    ///
    /// A missing counter starts from zero, so its first value is 1.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Raise the counter to at least `floor` and return the resulting value.
    ///
    /// Never lowers a counter.
    async fn seed(&self, key: &str, floor: i64) -> Result<i64, StoreError>;

    /// Current counter value, if the counter exists.
    async fn current(&self, key: &str) -> Result<Option<i64>, StoreError>;
}

/// A backend serving both documents and counters.
pub trait Store: DocumentStore + CounterStore {}

impl<T: DocumentStore + CounterStore + ?Sized> Store for T {}

/// Bound a store round trip so a stalled backend cannot hang the caller.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
