//! Drives a migration pass: users, then tasks, then subtasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use taskport_store::{EntityKind, Store, UpsertOutcome};
use tracing::{info, warn};

use crate::error::MigrateError;
use crate::project::SourceRecord;
use crate::seed::CounterSeeder;
use crate::source::SourceReader;
use crate::upsert::{Upserter, WriteMode};
use crate::watermark::HighWatermarks;

/// Knobs for a migration pass.
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    /// Compute and log every write without touching the target store.
    pub dry_run: bool,
    /// Bound on each target store round trip.
    pub store_timeout: Duration,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            store_timeout: Duration::from_secs(30),
        }
    }
}

/// How a failure on one kind affects the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Importance {
    /// Failures abort the pass.
    Primary,
    /// Failures are logged; the pass continues.
    Auxiliary,
}

/// Per-kind result of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    pub kind: EntityKind,
    /// Rows read from the source.
    pub read: usize,
    /// Rows written (or planned, in a dry run).
    pub migrated: usize,
    /// Rows that failed projection or write.
    pub failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// High-watermark of ids read.
    pub max_id: Option<i64>,
    /// Counter value after seeding; `None` if not seeded.
    pub counter: Option<i64>,
    /// The source table could not be read at all.
    pub source_skipped: bool,
}

impl EntitySummary {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            read: 0,
            migrated: 0,
            failed: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            max_id: None,
            counter: None,
            source_skipped: false,
        }
    }

    fn record(&mut self, outcome: Option<UpsertOutcome>) {
        self.migrated += 1;
        match outcome {
            Some(UpsertOutcome::Inserted) => self.inserted += 1,
            Some(UpsertOutcome::Updated) => self.updated += 1,
            Some(UpsertOutcome::Unchanged) => self.unchanged += 1,
            None => {}
        }
    }
}

/// Result of a complete pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub dry_run: bool,
    pub entities: Vec<EntitySummary>,
    pub watermarks: HighWatermarks,
}

impl MigrationSummary {
    pub fn entity(&self, kind: EntityKind) -> Option<&EntitySummary> {
        self.entities.iter().find(|e| e.kind == kind)
    }

    /// Rows migrated for `kind`, zero if the kind was not part of the pass.
    pub fn migrated(&self, kind: EntityKind) -> usize {
        self.entity(kind).map_or(0, |e| e.migrated)
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            f.write_str("DRY RUN ")?;
        }
        f.write_str("migrated")?;
        for entity in &self.entities {
            write!(f, " {}={}", entity.kind.collection(), entity.migrated)?;
        }
        f.write_str(" max_ids=")?;
        for (i, entity) in self.entities.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match entity.max_id {
                Some(id) => write!(f, "{}:{}", entity.kind, id)?,
                None => write!(f, "{}:-", entity.kind)?,
            }
        }
        Ok(())
    }
}

/// A single migration pass from a source database into a target store.
pub struct Migrator {
    source: SourceReader,
    upserter: Upserter,
    seeder: CounterSeeder,
    watermarks: HighWatermarks,
}

impl Migrator {
    pub fn new(source: SourceReader, store: Arc<dyn Store>, options: MigrationOptions) -> Self {
        let mode = if options.dry_run {
            WriteMode::DryRun
        } else {
            WriteMode::Apply
        };
        Self {
            source,
            upserter: Upserter::new(Arc::clone(&store), mode, options.store_timeout),
            seeder: CounterSeeder::new(store, mode, options.store_timeout),
            watermarks: HighWatermarks::new(),
        }
    }

    /// Run the pass to completion, or stop at the first primary-kind failure.
    pub async fn run(mut self) -> Result<MigrationSummary, MigrateError> {
        let dry_run = self.upserter.mode() == WriteMode::DryRun;
        if dry_run {
            info!("DRY RUN: no writes will be performed to the document store");
        }

        let users = match self.source.read_users() {
            Ok(rows) => self.migrate_rows(rows, Importance::Auxiliary).await?,
            Err(e) => {
                warn!(error = %e, "could not read users; continuing without them");
                EntitySummary {
                    source_skipped: true,
                    ..EntitySummary::new(EntityKind::User)
                }
            }
        };

        let rows = self.source.read_tasks()?;
        let tasks = self.migrate_rows(rows, Importance::Primary).await?;

        let rows = self.source.read_subtasks()?;
        let subtasks = self.migrate_rows(rows, Importance::Primary).await?;

        let summary = MigrationSummary {
            dry_run,
            entities: vec![users, tasks, subtasks],
            watermarks: self.watermarks,
        };
        info!(summary = %summary, "migration finished");
        Ok(summary)
    }

    async fn migrate_rows<R: SourceRecord>(
        &mut self,
        rows: Vec<R>,
        importance: Importance,
    ) -> Result<EntitySummary, MigrateError> {
        let kind = R::KIND;
        let mut summary = EntitySummary::new(kind);
        summary.read = rows.len();

        for row in rows {
            let id = row.id();
            // Every id read counts, so a failed write can never be handed out again.
            self.watermarks.observe(kind, id);

            let document = match row.project() {
                Ok(doc) => doc,
                Err(e) if importance == Importance::Auxiliary => {
                    warn!(entity = %kind, id, error = %e, "skipping unprojectable row");
                    summary.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.upserter.upsert(kind, id, document).await {
                Ok(report) => summary.record(report.outcome),
                Err(e) if importance == Importance::Auxiliary => {
                    warn!(entity = %kind, id, error = %e, "failed to upsert; continuing");
                    summary.failed += 1;
                }
                Err(source) => {
                    return Err(MigrateError::WriteFailure {
                        target: format!("{kind} {id}"),
                        source,
                    });
                }
            }
        }

        summary.max_id = self.watermarks.get(kind);
        info!(
            entity = %kind,
            read = summary.read,
            migrated = summary.migrated,
            failed = summary.failed,
            max_id = ?summary.max_id,
            "entity migration complete"
        );

        if let Some(watermark) = summary.max_id {
            match self.seeder.seed(kind, watermark).await {
                Ok(value) => summary.counter = value,
                Err(e) if importance == Importance::Auxiliary => {
                    warn!(counter = kind.counter_key(), error = %e, "failed to seed counter");
                }
                Err(source) => {
                    return Err(MigrateError::WriteFailure {
                        target: format!("counter '{}'", kind.counter_key()),
                        source,
                    });
                }
            }
        }

        Ok(summary)
    }
}
