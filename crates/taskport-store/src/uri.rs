//! Target store URIs.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::store::Store;

/// Local default used when no target URI is configured.
pub const DEFAULT_TARGET_URI: &str = "sqlite://taskport-docs.db";

/// A parsed target store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetUri {
    /// `sqlite://<path>`
    Sqlite(PathBuf),
    /// `memory://`
    Memory,
}

impl FromStr for TargetUri {
    type Err = StoreError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StoreError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("expected <scheme>://"))?;
        match scheme {
            "sqlite" if rest.is_empty() => Err(invalid("missing database path")),
            "sqlite" => Ok(TargetUri::Sqlite(PathBuf::from(rest))),
            "memory" => Ok(TargetUri::Memory),
            _ => Err(invalid("supported schemes are sqlite:// and memory://")),
        }
    }
}

/// Open the store a URI points at.
pub fn open_store(uri: &str) -> Result<Arc<dyn Store>, StoreError> {
    match uri.parse::<TargetUri>()? {
        TargetUri::Sqlite(path) => Ok(Arc::new(SqliteStore::open(path)?)),
        TargetUri::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
