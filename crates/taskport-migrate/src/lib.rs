//! One-shot migration from the relational task database into the document store.
//!
//! A pass reads `Users`, `Tasks` and `Subtasks` in that order, projects each row into a
//! sparse document, upserts it by business id, tracks the highest id seen per entity
//! kind and finally raises each kind's counter to that high-watermark so live
//! allocation continues above every migrated id.
//!
//! Users are auxiliary: an unreadable table or a failed user write is logged and the
//! pass continues. Tasks and subtasks are primary: any failure aborts the pass.

mod error;
mod migrator;
mod project;
mod seed;
mod source;
mod upsert;
mod watermark;

pub use error::MigrateError;
pub use migrator::{EntitySummary, MigrationOptions, MigrationSummary, Migrator};
pub use project::{SourceRecord, narrow_i32};
pub use seed::CounterSeeder;
pub use source::{DEFAULT_SOURCE, SourceReader, SubtaskRow, TaskRow, UserRow, parse_timestamp};
pub use upsert::{PlannedWrite, Upserter, WriteMode, WriteReport};
pub use watermark::HighWatermarks;
