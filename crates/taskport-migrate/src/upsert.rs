//! Idempotent upserts keyed by business id, with a dry-run mode.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use taskport_store::{Document, EntityKind, Store, StoreError, UpsertOutcome, with_timeout};
use tracing::{debug, info};

/// Whether writes reach the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Apply,
    DryRun,
}

/// The exact write an upsert performs, or would perform in a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub collection: &'static str,
    pub id: i64,
    /// Field names being set, sorted.
    pub fields: Vec<String>,
}

/// Outcome of one upsert call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub plan: PlannedWrite,
    /// `None` in dry-run mode.
    pub outcome: Option<UpsertOutcome>,
}

/// Writes projected documents into their collection.
pub struct Upserter {
    store: Arc<dyn Store>,
    mode: WriteMode,
    timeout: Duration,
}

impl Upserter {
    pub fn new(store: Arc<dyn Store>, mode: WriteMode, timeout: Duration) -> Self {
        Self {
            store,
            mode,
            timeout,
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Merge `document` into the stored document for (`kind`, `id`).
    pub async fn upsert(
        &self,
        kind: EntityKind,
        id: i64,
        mut document: Document,
    ) -> Result<WriteReport, StoreError> {
        document.insert("id".to_string(), Value::from(id));
        let plan = PlannedWrite {
            collection: kind.collection(),
            id,
            fields: document.keys().cloned().collect(),
        };

        if self.mode == WriteMode::DryRun {
            info!(
                entity = %kind,
                id,
                collection = plan.collection,
                fields = ?plan.fields,
                "DRY RUN: would upsert"
            );
            return Ok(WriteReport {
                plan,
                outcome: None,
            });
        }

        let outcome = with_timeout(
            self.timeout,
            self.store.upsert(kind.collection(), id, document),
        )
        .await?;
        debug!(entity = %kind, id, ?outcome, "upserted");
        Ok(WriteReport {
            plan,
            outcome: Some(outcome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskport_store::{DocumentStore, MemoryStore};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_dry_run_reports_plan_without_writing() {
        let store = Arc::new(MemoryStore::new());
        let upserter = Upserter::new(store.clone(), WriteMode::DryRun, Duration::from_secs(1));

        let report = upserter
            .upsert(EntityKind::Task, 5, doc(json!({"title": "t", "completed": true})))
            .await
            .unwrap();

        assert_eq!(report.outcome, None);
        assert_eq!(report.plan.collection, "tasks");
        assert_eq!(report.plan.fields, ["completed", "id", "title"]);
        assert!(store.is_empty("tasks"));
    }

    #[tokio::test]
    async fn test_second_identical_upsert_is_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let upserter = Upserter::new(store.clone(), WriteMode::Apply, Duration::from_secs(1));
        let d = doc(json!({"name": "Ada"}));

        let first = upserter.upsert(EntityKind::User, 1, d.clone()).await.unwrap();
        let after_first = store.get("users", 1).await.unwrap();
        let second = upserter.upsert(EntityKind::User, 1, d).await.unwrap();
        let after_second = store.get("users", 1).await.unwrap();

        assert_eq!(first.outcome, Some(UpsertOutcome::Inserted));
        assert_eq!(second.outcome, Some(UpsertOutcome::Unchanged));
        assert_eq!(after_first, after_second);
    }
}
