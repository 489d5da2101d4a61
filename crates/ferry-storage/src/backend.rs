//! The pluggable storage backend trait and its local-filesystem default.
//!
//! `StorageBackend` is the capability set every storage target must
//! implement: `put`/`get`/`delete`/`exists`/`stat`/`list`. Dispatch is
//! dynamic (`Arc<dyn StorageBackend>`) so a [`crate::manager::StorageManager`]
//! can be built against any backend without generic parameters leaking
//! through the rest of the crate.

use async_trait::async_trait;
use ferry_core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata about a stored object, as reported by [`StorageBackend::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    /// The object's key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Unix timestamp (seconds) of last modification.
    pub modified_at: u64,
}

/// A storage target capable of holding object bytes under string keys.
///
/// Implementations are expected to be cheaply `Clone`-able or held behind
/// an `Arc`, since [`crate::manager::StorageManager`] shares one instance
/// across every transfer.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read the full contents of `key`.
    ///
    /// Returns [`Error::NotFound`] if no such object exists.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove `key`. Not an error if it does not exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Metadata for `key`.
    ///
    /// Returns [`Error::NotFound`] if no such object exists.
    async fn stat(&self, key: &str) -> Result<ObjectStat>;

    /// Every key beginning with `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// A [`StorageBackend`] backed by a directory on the local filesystem.
///
/// Keys are joined onto `root` as relative paths; a key containing `..` or
/// an absolute path component is rejected to keep every object confined to
/// `root`.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    /// Build a backend rooted at `root`, creating the directory if it does
    /// not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `root` cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let candidate = Path::new(key);
        if candidate.is_absolute() || candidate.components().any(|c| c.as_os_str() == "..") {
            return Err(Error::InvalidConfig(format!("unsafe storage key: {key}")));
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        tracing::debug!(key, bytes = data.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| map_not_found(e, key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "deleted object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        let path = self.resolve(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_not_found(e, key))?;
        let modified_at = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(ObjectStat {
            key: key.to_string(),
            size: meta.len(),
            modified_at,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

fn map_not_found(e: std::io::Error, key: &str) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(key.to_string())
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).await.unwrap();
        backend.put("a/b.bin", b"hello").await.unwrap();
        assert_eq!(backend.get("a/b.bin").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).await.unwrap();
        assert!(matches!(
            backend.get("nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).await.unwrap();
        backend.put("x", b"1").await.unwrap();
        backend.delete("x").await.unwrap();
        backend.delete("x").await.unwrap();
        assert!(!backend.exists("x").await.unwrap());
    }

    #[tokio::test]
    async fn stat_reports_size() {
        let dir = tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).await.unwrap();
        backend.put("f", b"12345").await.unwrap();
        let stat = backend.stat("f").await.unwrap();
        assert_eq!(stat.size, 5);
        assert_eq!(stat.key, "f");
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let dir = tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).await.unwrap();
        backend.put("transfers/a.part", b"1").await.unwrap();
        backend.put("transfers/b.part", b"2").await.unwrap();
        backend.put("other/c.part", b"3").await.unwrap();

        let mut keys = backend.list("transfers/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["transfers/a.part", "transfers/b.part"]);
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).await.unwrap();
        assert!(backend.put("../escape", b"x").await.is_err());
        assert!(backend.put("/abs/path", b"x").await.is_err());
    }
}
