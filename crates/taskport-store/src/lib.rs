//! Storage layer for Taskport.
//!
//! This crate provides the target side of the data plane:
//! - **Documents**: sparse JSON documents keyed by a business `id`, grouped in collections
//! - **Counters**: one sequence value per entity kind, only ever raised
//! - **Backends**: a SQLite-backed store (`sqlite://path`) and an in-memory store (`memory://`)
//! - **Sequence allocation**: the atomic increment-and-return used by the live API

mod document;
mod error;
mod kind;
mod memory;
mod sequence;
mod sqlite;
mod store;
mod uri;

pub use document::{Document, Filter, UpsertOutcome, business_id, merge_fields};
pub use error::StoreError;
pub use kind::EntityKind;
pub use memory::MemoryStore;
pub use sequence::{AllocationError, SequenceAllocator};
pub use sqlite::SqliteStore;
pub use store::{CounterStore, DocumentStore, Store, with_timeout};
pub use uri::{DEFAULT_TARGET_URI, TargetUri, open_store};
