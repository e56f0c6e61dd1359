//! Append-only, timestamp-keyed snapshots of raw collections and summaries.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use donorwall_core::Collection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::canonical::{canonical_key, has_canonical_blob, translate_canonical};
use crate::{BlobStore, StorageError};

/// What a snapshot holds: one raw collection or the derived summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Collection(Collection),
    Summary,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Collection(collection) => collection.as_str(),
            SnapshotKind::Summary => "summary",
        }
    }
}

impl From<Collection> for SnapshotKind {
    fn from(collection: Collection) -> Self {
        SnapshotKind::Collection(collection)
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which read path `try_latest` uses. Writes always go to the timestamped
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLayout {
    Timestamped,
    /// One fixed blob per type under `prefix`, in the production export format.
    Canonical { prefix: String },
}

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub prefix: String,
    pub namespace: String,
    pub layout: SnapshotLayout,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            prefix: "givebutter-data".to_string(),
            namespace: "givebutter".to_string(),
            layout: SnapshotLayout::Timestamped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub key: String,
    pub content_hash: String,
    pub byte_size: usize,
}

pub struct SnapshotStore {
    blobs: Arc<dyn BlobStore>,
    config: SnapshotConfig,
    last_stamp_micros: AtomicI64,
}

impl SnapshotStore {
    pub fn new(blobs: Arc<dyn BlobStore>, config: SnapshotConfig) -> Self {
        Self {
            blobs,
            config,
            last_stamp_micros: AtomicI64::new(i64::MIN),
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// `{prefix}/{namespace}/{kind}/`
    pub fn kind_prefix(&self, kind: SnapshotKind) -> String {
        format!("{}/{}/{}/", self.config.prefix, self.config.namespace, kind)
    }

    /// Fixed-width UTC stamp so lexicographic order is chronological.
    pub fn snapshot_key(&self, kind: SnapshotKind, at: DateTime<Utc>) -> String {
        format!(
            "{}{}",
            self.kind_prefix(kind),
            at.format("%Y%m%dT%H%M%S_%6fZ.json")
        )
    }

    /// Strictly increasing across calls, even when the wall clock repeats or
    /// steps backwards.
    fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now_micros = now.timestamp_micros();
        let previous = self
            .last_stamp_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_micros.max(last.saturating_add(1)))
            })
            .unwrap_or(now_micros);
        let stamp = now_micros.max(previous.saturating_add(1));
        DateTime::from_timestamp_micros(stamp).unwrap_or(now)
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        kind: SnapshotKind,
        payload: &T,
    ) -> Result<StoredSnapshot, StorageError> {
        let at = self.next_stamp(Utc::now());
        self.put_at(kind, payload, at).await
    }

    /// Writes under the key for `at`. Never replaces an existing snapshot.
    pub async fn put_at<T: Serialize + ?Sized>(
        &self,
        kind: SnapshotKind,
        payload: &T,
        at: DateTime<Utc>,
    ) -> Result<StoredSnapshot, StorageError> {
        let bytes = serde_json::to_vec_pretty(payload).map_err(|source| StorageError::Encode {
            kind: kind.to_string(),
            source,
        })?;
        let key = self.snapshot_key(kind, at);
        self.blobs.put_new(&key, &bytes).await?;
        info!(kind = %kind, key = %key, bytes = bytes.len(), "stored snapshot");
        Ok(StoredSnapshot {
            content_hash: Self::sha256_hex(&bytes),
            byte_size: bytes.len(),
            key,
        })
    }

    /// Lexicographically greatest key in the kind's timestamped namespace.
    pub async fn latest_key(&self, kind: SnapshotKind) -> Result<Option<String>, StorageError> {
        let keys = self.blobs.list(&self.kind_prefix(kind)).await?;
        Ok(keys.into_iter().filter(|key| key.ends_with(".json")).max())
    }

    /// Latest snapshot for `kind`, surfacing storage and decode failures.
    pub async fn try_latest<T: DeserializeOwned>(
        &self,
        kind: SnapshotKind,
    ) -> Result<Option<T>, StorageError> {
        if let SnapshotLayout::Canonical { prefix } = &self.config.layout {
            if has_canonical_blob(kind) {
                return self.read_canonical(prefix, kind).await;
            }
        }

        let Some(key) = self.latest_key(kind).await? else {
            return Ok(None);
        };
        let Some(bytes) = self.blobs.get(&key).await? else {
            return Ok(None);
        };
        let payload = serde_json::from_slice(&bytes)
            .map_err(|source| StorageError::Decode { key: key.clone(), source })?;
        info!(kind = %kind, key = %key, "loaded latest snapshot");
        Ok(Some(payload))
    }

    /// Like [`Self::try_latest`] but degrades every failure to "no data".
    pub async fn get_latest<T: DeserializeOwned>(&self, kind: SnapshotKind) -> Option<T> {
        match self.try_latest(kind).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(kind = %kind, error = %err, "failed to read latest snapshot");
                None
            }
        }
    }

    async fn read_canonical<T: DeserializeOwned>(
        &self,
        prefix: &str,
        kind: SnapshotKind,
    ) -> Result<Option<T>, StorageError> {
        let key = canonical_key(prefix, kind);
        let Some(bytes) = self.blobs.get(&key).await? else {
            warn!(kind = %kind, key = %key, "canonical snapshot not found");
            return Ok(None);
        };
        let raw: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|source| StorageError::Decode { key: key.clone(), source })?;
        let payload = serde_json::from_value(translate_canonical(kind, raw))
            .map_err(|source| StorageError::Decode { key: key.clone(), source })?;
        info!(kind = %kind, key = %key, "loaded canonical snapshot");
        Ok(Some(payload))
    }
}
