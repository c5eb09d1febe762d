//! Error types for a migration pass.

use taskport_store::{EntityKind, StoreError};
use thiserror::Error;

/// Errors that can stop or degrade a migration pass.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Source database could not be opened or a query failed.
    #[error("source unavailable while {context}: {source}")]
    SourceUnavailable {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A source value does not fit the document field it maps to.
    #[error("{kind} {id}: field '{field}' value {value} does not fit the target range")]
    ProjectionRange {
        kind: EntityKind,
        id: i64,
        field: &'static str,
        value: i64,
    },

    /// The target store rejected or failed a write.
    #[error("write failed for {target}: {source}")]
    WriteFailure {
        target: String,
        #[source]
        source: StoreError,
    },
}

impl MigrateError {
    pub(crate) fn source_unavailable(
        context: impl Into<String>,
    ) -> impl FnOnce(rusqlite::Error) -> Self {
        let context = context.into();
        move |source| MigrateError::SourceUnavailable { context, source }
    }
}
