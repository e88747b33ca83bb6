//! Blob storage as a narrow external-collaborator trait. The recording
//! pipeline uploads raw capture archives and rendered outputs through this
//! seam; only a local filesystem implementation ships here, mirroring how
//! cloud object-storage backends are kept behind a trait boundary upstream.

use std::path::PathBuf;

use b3lb_core::error::{B3lbError, Result};

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Stores blobs as files under a root directory, `key` taken verbatim as a
/// relative path (callers pass `RecordSet::blob_path` segments already
/// joined with `/`).
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.resolve(key))
            .await
            .map_err(|e| B3lbError::Store(format!("blob {key} not readable: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store.put("a/b/c.webm", b"payload").await.unwrap();
        assert!(store.exists("a/b/c.webm").await.unwrap());
        assert_eq!(store.get("a/b/c.webm").await.unwrap(), b"payload");

        store.delete("a/b/c.webm").await.unwrap();
        assert!(!store.exists("a/b/c.webm").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.delete("missing").await.unwrap();
    }
}
