//! Seeding allocation counters from a pass's high-watermarks.

use std::sync::Arc;
use std::time::Duration;

use taskport_store::{EntityKind, Store, StoreError, with_timeout};
use tracing::{info, warn};

use crate::upsert::WriteMode;

/// Raises each kind's counter to the watermark of a migration pass.
///
/// Seeding is raise-only, so re-running a migration after live traffic has
/// advanced a counter leaves that counter where it is.
pub struct CounterSeeder {
    store: Arc<dyn Store>,
    mode: WriteMode,
    timeout: Duration,
}

impl CounterSeeder {
    pub fn new(store: Arc<dyn Store>, mode: WriteMode, timeout: Duration) -> Self {
        Self {
            store,
            mode,
            timeout,
        }
    }

    /// Seed the counter for `kind`. Returns the resulting counter value, or
    /// `None` in dry-run mode or when the watermark is not a valid id.
    pub async fn seed(&self, kind: EntityKind, watermark: i64) -> Result<Option<i64>, StoreError> {
        let key = kind.counter_key();
        // Ids start at 1; a non-positive floor would leave the allocator below it.
        if watermark <= 0 {
            warn!(counter = key, watermark, "watermark is not positive; counter not seeded");
            return Ok(None);
        }
        if self.mode == WriteMode::DryRun {
            info!(counter = key, watermark, "DRY RUN: would seed counter");
            return Ok(None);
        }

        let value = with_timeout(self.timeout, self.store.seed(key, watermark)).await?;
        if value > watermark {
            info!(
                counter = key,
                watermark, value, "counter already ahead of watermark; left unchanged"
            );
        } else {
            info!(counter = key, value, "counter seeded");
        }
        Ok(Some(value))
    }
}
