//! Document blob storage
//!
//! Keys are `/`-separated paths of simple segments (`<practice>/<document>`).
//! The local implementation maps them onto a directory tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tpm_common::{Error, Result};
use tracing::debug;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous blob
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read the blob at `key`; a missing blob is `NotFound`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove the blob at `key`; removing a missing blob is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Blob store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(Error::InvalidInput(format!("Invalid blob key '{}'", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never see a partially written blob
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(key, size = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob '{}'", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store.put("practice-1/doc-1", b"first").await.unwrap();
        store.put("practice-1/doc-1", b"second").await.unwrap();

        assert_eq!(store.get("practice-1/doc-1").await.unwrap(), b"second");
        assert!(store.exists("practice-1/doc-1").await.unwrap());
        assert!(dir.path().join("practice-1").join("doc-1").is_file());
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        assert!(matches!(store.get("a/b").await, Err(Error::NotFound(_))));
        assert!(!store.exists("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_blob_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store.put("practice-1/doc-1", b"bytes").await.unwrap();
        store.delete("practice-1/doc-1").await.unwrap();
        assert!(!store.exists("practice-1/doc-1").await.unwrap());

        store.delete("practice-1/doc-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for key in ["../escape", "a//b", "/abs", "a/./b", ""] {
            assert!(
                matches!(store.put(key, b"x").await, Err(Error::InvalidInput(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }
}
