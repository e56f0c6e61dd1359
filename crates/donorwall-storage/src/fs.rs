//! Filesystem-backed blob store: one bucket directory, keys map to paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use crate::{io_err, validate_key, BlobStore, StorageError};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    /// Temp file + hard link so readers never observe a half-written blob.
    /// Linking fails if the key exists, even against another process.
    async fn put_new(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let absolute_path = self.path_for(key)?;
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .map_err(|err| io_err(key, err))?;

        if fs::try_exists(&absolute_path)
            .await
            .map_err(|err| io_err(key, err))?
        {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(|err| io_err(key, err))?;
        file.write_all(bytes).await.map_err(|err| io_err(key, err))?;
        file.flush().await.map_err(|err| io_err(key, err))?;
        drop(file);

        let linked = fs::hard_link(&temp_path, &absolute_path).await;
        if let Err(err) = fs::remove_file(&temp_path).await {
            warn!(key, error = %err, "failed to remove temp blob");
        }
        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists {
                    key: key.to_string(),
                })
            }
            Err(err) => Err(io_err(key, err)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(key, err)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Walk from the deepest directory the prefix fully names.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_part)?
        };

        let mut keys = Vec::new();
        let mut pending = vec![(start, dir_part.to_string())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(key_prefix, err)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| io_err(&key_prefix, err))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let key = if key_prefix.is_empty() {
                    name
                } else {
                    format!("{key_prefix}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|err| io_err(&key, err))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_new_refuses_to_overwrite() {
        let dir = tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());

        store
            .put_new("ns/contacts/a.json", b"{\"data\":[]}")
            .await
            .expect("first write");
        let err = store
            .put_new("ns/contacts/a.json", b"other")
            .await
            .expect_err("second write must fail");
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        let bytes = store.get("ns/contacts/a.json").await.expect("get").expect("present");
        assert_eq!(bytes, b"{\"data\":[]}");
        assert!(dir.path().join("ns").join("contacts").join("a.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_writers_get_exactly_one_winner() {
        let dir = tempdir().expect("tempdir");
        let mut handles = Vec::new();
        for writer in 0..8u8 {
            // Separate store handles, as separate processes would have.
            let store = FsBlobStore::new(dir.path());
            handles.push(tokio::spawn(async move {
                store
                    .put_new("ns/summary/same.json", &[writer])
                    .await
                    .map(|()| writer)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.expect("join") {
                Ok(writer) => winners.push(writer),
                Err(err) => assert!(matches!(err, StorageError::AlreadyExists { .. })),
            }
        }
        assert_eq!(winners.len(), 1);

        let store = FsBlobStore::new(dir.path());
        let bytes = store.get("ns/summary/same.json").await.expect("get").expect("present");
        assert_eq!(bytes, vec![winners[0]]);

        // No temp files are left behind.
        let leftovers = std::fs::read_dir(dir.path().join("ns").join("summary"))
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn missing_blob_is_none() {
        let dir = tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        assert!(store.get("nope/x.json").await.expect("get").is_none());
        assert!(store.list("nope/").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn list_is_recursive_and_prefix_filtered() {
        let dir = tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        for key in [
            "p/ns/contacts/1.json",
            "p/ns/contacts/2.json",
            "p/ns/contacts-old/1.json",
            "p/ns/plans/1.json",
        ] {
            store.put_new(key, b"{}").await.expect("put");
        }

        let mut keys = store.list("p/ns/contacts/").await.expect("list");
        keys.sort();
        assert_eq!(keys, vec!["p/ns/contacts/1.json", "p/ns/contacts/2.json"]);

        let mut all = store.list("p/").await.expect("list all");
        all.sort();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let err = store.put_new("../escape.json", b"x").await.expect_err("invalid");
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}
