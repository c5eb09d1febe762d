//! Live sequence allocation.
//!
//! The allocator is the only writer of counters at serving time. Every call is a
//! single atomic round trip to the counter store; nothing is cached locally, so
//! several serving processes can share one store.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::kind::EntityKind;
use crate::store::{Store, with_timeout};

/// Allocation could not produce a fresh id. The request that needed it must fail.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The counter store failed or timed out.
    #[error("failed to allocate {kind} id from counter '{key}': {source}")]
    Store {
        kind: EntityKind,
        key: &'static str,
        #[source]
        source: StoreError,
    },

    /// The store answered with a value that can never be a fresh id.
    #[error("counter '{key}' returned non-positive value {value}")]
    NonPositive { key: &'static str, value: i64 },
}

/// Hands out monotonically increasing business ids per entity kind.
#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl SequenceAllocator {
    /// Create an allocator over `store`; every round trip is bounded by `timeout`.
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Allocate the next id for `kind`.
    pub async fn next(&self, kind: EntityKind) -> Result<i64, AllocationError> {
        let key = kind.counter_key();
        let value = with_timeout(self.timeout, self.store.increment(key))
            .await
            .map_err(|source| AllocationError::Store { kind, key, source })?;
        if value <= 0 {
            return Err(AllocationError::NonPositive { key, value });
        }
        Ok(value)
    }

    /// Raise the counter for `kind` above every id already persisted for it.
    ///
    /// Run before serving so the first live allocation cannot collide with
    /// migrated or previously created documents. Returns the counter value.
    pub async fn ensure_floor(&self, kind: EntityKind) -> Result<i64, AllocationError> {
        let key = kind.counter_key();
        let wrap = |source| AllocationError::Store { kind, key, source };

        let max_id = with_timeout(self.timeout, self.store.max_id(kind.collection()))
            .await
            .map_err(wrap)?
            .unwrap_or(0);
        let before = with_timeout(self.timeout, self.store.current(key))
            .await
            .map_err(wrap)?;
        let after = with_timeout(self.timeout, self.store.seed(key, max_id))
            .await
            .map_err(wrap)?;

        if after > before.unwrap_or(0) {
            warn!(
                counter = key,
                previous = ?before,
                max_id,
                "counter was below persisted ids; raised before serving"
            );
        } else {
            info!(counter = key, value = after, "counter floor verified");
        }
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CounterStore, MemoryStore};

    fn allocator(store: Arc<MemoryStore>) -> SequenceAllocator {
        SequenceAllocator::new(store, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_first_allocation_is_one() {
        let alloc = allocator(Arc::new(MemoryStore::new()));
        assert_eq!(alloc.next(EntityKind::Attachment).await.unwrap(), 1);
        assert_eq!(alloc.next(EntityKind::Attachment).await.unwrap(), 2);
        assert_eq!(alloc.next(EntityKind::Task).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_allocation_follows_seed() {
        let store = Arc::new(MemoryStore::new());
        store.seed("taskid", 57).await.unwrap();
        let alloc = allocator(store);
        assert_eq!(alloc.next(EntityKind::Task).await.unwrap(), 58);
    }
}
