//! Error types for the document and counter stores.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when reading or writing the target store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored body was not a JSON object.
    #[error("corrupt document in {collection} with id {id}: body is not an object")]
    CorruptDocument { collection: String, id: i64 },

    /// A document was written without an integer `id` field.
    #[error("document for {collection} has no integer `id` field")]
    MissingId { collection: String },

    /// Insert collided with an existing business id.
    #[error("document already exists: {collection}/{id}")]
    Duplicate { collection: String, id: i64 },

    /// Target URI could not be understood.
    #[error("invalid store URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The store did not answer within the configured bound.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The connection lock was poisoned by a panicking writer.
    #[error("store connection lock poisoned")]
    Poisoned,

    /// Blocking task failed to complete.
    #[error("blocking store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
