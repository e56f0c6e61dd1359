//! Blob storage + timestamped snapshot persistence for the donor wall.
//!
//! The object store itself is an external collaborator; everything here talks
//! to it through [`BlobStore`], a get / put-new / list-by-prefix interface.

use async_trait::async_trait;
use thiserror::Error;

mod canonical;
pub mod fs;
pub mod memory;
pub mod snapshot;

pub use canonical::translate_canonical;
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use snapshot::{SnapshotConfig, SnapshotKind, SnapshotLayout, SnapshotStore, StoredSnapshot};

pub const CRATE_NAME: &str = "donorwall-storage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob {key} already exists")]
    AlreadyExists { key: String },
    #[error("invalid blob key {key:?}")]
    InvalidKey { key: String },
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing {kind} snapshot: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed snapshot {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("blob backend error: {0}")]
    Backend(String),
}

pub(crate) fn io_err(key: impl Into<String>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.into(),
        source,
    }
}

/// Minimal object-store contract: keys are `/`-separated strings.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes a new blob. Fails with [`StorageError::AlreadyExists`] rather
    /// than replacing an existing key.
    async fn put_new(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// All keys starting with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Rejects keys that could escape a filesystem root or alias another key.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == ".." || segment.starts_with('.'));
    if bad {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(validate_key("givebutter-data/givebutter/contacts/20250101T000000_000000Z.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs/key").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a/.hidden").is_err());
        assert!(validate_key("a/b/").is_err());
    }
}
