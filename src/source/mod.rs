//! Remote zone sources.
//!
//! A source lists zone objects with their modification time and hands out
//! the raw bytes of one object. The reload coordinator only talks to the
//! [`ZoneSource`] trait, so the object store, a local directory and the
//! in-memory catalog used by tests are interchangeable.

pub mod directory;
pub mod memory;
pub mod object_store;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use directory::DirectorySource;
pub use memory::MemorySource;
pub use object_store::ObjectStoreSource;

/// Metadata of one object in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneObject {
    /// Full key, including any configured prefix
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl ZoneObject {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Zone source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("No zone objects under prefix '{0}'")]
    EmptyCatalog(String),

    #[error("Zone object not found: {0}")]
    ObjectNotFound(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Whether `key` sits directly under `prefix`, with no further `/` after
/// it. Mirrors a bucket listing with `delimiter=/`.
pub fn is_direct_child(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| !rest.contains('/'))
}

#[async_trait]
pub trait ZoneSource: Send + Sync {
    /// List the objects directly under `prefix`; keys below a further `/`
    /// are not zones. An empty listing is reported as
    /// [`SourceError::EmptyCatalog`].
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ZoneObject>>;

    /// Fetch the full content of one object
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Short description for logs
    fn describe(&self) -> String;
}
