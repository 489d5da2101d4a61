//! Quota admission and eviction ordering over a [`StorageManager`].
//!
//! `PolicyEngine` does not touch the backend directly: [`select_victims`]
//! is a pure function over a metadata snapshot, and [`admit`] is the only
//! method that actually deletes anything, via the manager it's given.
//! Eviction is not transactional — if a later victim's delete fails, the
//! earlier ones stay deleted.

use crate::manager::{ObjectMeta, StorageManager};
use ferry_core::config::EvictionPolicy;
use ferry_core::error::{Error, Result};
use std::collections::HashSet;
use std::sync::Mutex;

/// Enforces per-file size limits, a global storage quota, and an eviction
/// order over objects not currently pinned.
pub struct PolicyEngine {
    max_file_size: u64,
    quota: u64,
    eviction_policy: EvictionPolicy,
    pinned: Mutex<HashSet<String>>,
}

impl PolicyEngine {
    /// Build a policy engine with no pinned objects yet.
    #[must_use]
    pub fn new(max_file_size: u64, quota: u64, eviction_policy: EvictionPolicy) -> Self {
        Self {
            max_file_size,
            quota,
            eviction_policy,
            pinned: Mutex::new(HashSet::new()),
        }
    }

    /// Exempt `key` from eviction until [`unpin`](Self::unpin) is called.
    pub fn pin(&self, key: impl Into<String>) {
        self.pinned.lock().expect("pinned mutex poisoned").insert(key.into());
    }

    /// Make `key` eligible for eviction again.
    pub fn unpin(&self, key: &str) {
        self.pinned.lock().expect("pinned mutex poisoned").remove(key);
    }

    /// Whether `key` is currently pinned.
    #[must_use]
    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.lock().expect("pinned mutex poisoned").contains(key)
    }

    /// Reject `size` outright if it exceeds the configured per-file limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileTooLarge`] if `size > max_file_size`.
    pub fn check_file_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_size {
            return Err(Error::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Given the current set of tracked objects and their usage, and bytes
    /// about to be admitted, return the keys (in eviction order) that must
    /// be deleted to make room. Pinned objects are never selected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuotaExceeded`] if `incoming_size` still would not
    /// fit even after evicting every non-pinned object.
    pub fn select_victims(
        &self,
        objects: &[(String, ObjectMeta)],
        used_bytes: u64,
        incoming_size: u64,
    ) -> Result<Vec<String>> {
        if used_bytes.saturating_add(incoming_size) <= self.quota {
            return Ok(Vec::new());
        }

        let pinned = self.pinned.lock().expect("pinned mutex poisoned");
        let mut candidates: Vec<&(String, ObjectMeta)> =
            objects.iter().filter(|(k, _)| !pinned.contains(k)).collect();
        drop(pinned);

        match self.eviction_policy {
            EvictionPolicy::Lru => candidates.sort_by_key(|(_, m)| m.last_access_seq),
            EvictionPolicy::Lfu => candidates.sort_by_key(|(_, m)| m.access_count),
            EvictionPolicy::Fifo => candidates.sort_by_key(|(_, m)| m.stored_seq),
        }

        let mut remaining = used_bytes;
        let mut victims = Vec::new();
        for (key, meta) in candidates {
            if remaining.saturating_add(incoming_size) <= self.quota {
                break;
            }
            victims.push(key.clone());
            remaining = remaining.saturating_sub(meta.size);
        }

        if remaining.saturating_add(incoming_size) > self.quota {
            return Err(Error::QuotaExceeded {
                needed: incoming_size,
                available: self.quota.saturating_sub(remaining),
            });
        }
        Ok(victims)
    }

    /// Admit `data` under `key`: reject it outright if it is too large,
    /// evict victims (in policy order, skipping pinned objects) until it
    /// fits the quota, then store it via `manager`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileTooLarge`] or [`Error::QuotaExceeded`] if
    /// admission is not possible, or propagates a backend error from an
    /// eviction delete or the final `put`.
    pub async fn admit(&self, manager: &StorageManager, key: &str, data: Vec<u8>) -> Result<()> {
        self.check_file_size(data.len() as u64)?;

        let victims = self.select_victims(&manager.meta_snapshot(), manager.used_bytes(), data.len() as u64)?;
        if !victims.is_empty() {
            tracing::info!(key, victims = victims.len(), policy = ?self.eviction_policy, "evicting to admit object");
        }
        for victim in victims {
            manager.delete(&victim).await?;
        }
        manager.put(key, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalFsBackend;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn manager() -> (StorageManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let backend = Arc::new(LocalFsBackend::new(dir.path()).await.unwrap());
        (StorageManager::new(backend, true), dir)
    }

    #[tokio::test]
    async fn admit_rejects_oversized_files() {
        let (mgr, _dir) = manager().await;
        let policy = PolicyEngine::new(10, 1000, EvictionPolicy::Lru);
        assert!(matches!(
            policy.admit(&mgr, "a", vec![0u8; 20]).await,
            Err(Error::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn admit_fits_without_eviction_when_under_quota() {
        let (mgr, _dir) = manager().await;
        let policy = PolicyEngine::new(1000, 1000, EvictionPolicy::Lru);
        policy.admit(&mgr, "a", vec![0u8; 100]).await.unwrap();
        assert_eq!(mgr.used_bytes(), 100);
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_accessed_first() {
        let (mgr, _dir) = manager().await;
        let policy = PolicyEngine::new(1000, 150, EvictionPolicy::Lru);

        policy.admit(&mgr, "old", vec![0u8; 100]).await.unwrap();
        policy.admit(&mgr, "new", vec![0u8; 40]).await.unwrap();
        // touch "new" so "old" is the least recently accessed
        mgr.get("new").await.unwrap();

        policy.admit(&mgr, "incoming", vec![0u8; 50]).await.unwrap();

        assert!(!mgr.backend().exists("old").await.unwrap());
        assert!(mgr.backend().exists("new").await.unwrap());
        assert!(mgr.backend().exists("incoming").await.unwrap());
    }

    #[tokio::test]
    async fn pinned_objects_are_never_evicted() {
        let (mgr, _dir) = manager().await;
        let policy = PolicyEngine::new(1000, 120, EvictionPolicy::Lru);
        policy.admit(&mgr, "pinned", vec![0u8; 100]).await.unwrap();
        policy.pin("pinned");

        let result = policy.admit(&mgr, "incoming", vec![0u8; 50]).await;
        assert!(matches!(result, Err(Error::QuotaExceeded { .. })));
        assert!(mgr.backend().exists("pinned").await.unwrap());
    }

    #[tokio::test]
    async fn fifo_evicts_oldest_stored_first_regardless_of_access() {
        let (mgr, _dir) = manager().await;
        let policy = PolicyEngine::new(1000, 150, EvictionPolicy::Fifo);

        policy.admit(&mgr, "first", vec![0u8; 100]).await.unwrap();
        policy.admit(&mgr, "second", vec![0u8; 40]).await.unwrap();
        mgr.get("first").await.unwrap();
        mgr.get("first").await.unwrap();

        policy.admit(&mgr, "third", vec![0u8; 50]).await.unwrap();

        assert!(!mgr.backend().exists("first").await.unwrap());
        assert!(mgr.backend().exists("second").await.unwrap());
    }

    #[tokio::test]
    async fn lfu_evicts_least_frequently_accessed_first() {
        let (mgr, _dir) = manager().await;
        let policy = PolicyEngine::new(1000, 150, EvictionPolicy::Lfu);

        policy.admit(&mgr, "popular", vec![0u8; 100]).await.unwrap();
        policy.admit(&mgr, "rare", vec![0u8; 40]).await.unwrap();
        mgr.get("popular").await.unwrap();
        mgr.get("popular").await.unwrap();
        mgr.get("popular").await.unwrap();

        policy.admit(&mgr, "incoming", vec![0u8; 50]).await.unwrap();

        assert!(!mgr.backend().exists("rare").await.unwrap());
        assert!(mgr.backend().exists("popular").await.unwrap());
    }
}
