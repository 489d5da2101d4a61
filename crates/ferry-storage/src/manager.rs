//! Usage and access tracking over a [`StorageBackend`].
//!
//! `StorageManager` is the thing the rest of ferry actually talks to: it
//! forwards to the backend and keeps a `DashMap` of per-object metadata
//! (size, stored-at, last-access-at, access-count) that
//! [`crate::policy::PolicyEngine`] reads to pick eviction victims.

use crate::backend::StorageBackend;
use dashmap::DashMap;
use ferry_core::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-object bookkeeping used by [`crate::policy::PolicyEngine`] to rank
/// eviction candidates.
///
/// `stored_seq`/`last_access_seq` are ticks of the manager's internal
/// logical clock, not wall-clock time: a monotonic counter gives FIFO/LRU
/// a total order even when two objects are stored or accessed within the
/// same clock tick.
#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    /// Size in bytes, as reported at `put` time.
    pub size: u64,
    /// Logical-clock tick this object was (most recently) stored.
    pub stored_seq: u64,
    /// Logical-clock tick of the most recent `get`.
    pub last_access_seq: u64,
    /// Number of `get` calls observed, if access tracking is enabled.
    pub access_count: u64,
}

/// Tracks usage of a [`StorageBackend`]: total bytes, object count, and
/// (optionally) per-object access recency/frequency.
pub struct StorageManager {
    backend: Arc<dyn StorageBackend>,
    track_access: bool,
    meta: DashMap<String, ObjectMeta>,
    used_bytes: AtomicU64,
    clock: AtomicU64,
}

impl StorageManager {
    /// Wrap `backend`. When `track_access` is `false`, `get` skips updating
    /// `last_access_seq`/`access_count`, which makes LRU/LFU eviction
    /// ineffective but avoids the bookkeeping cost for callers that never
    /// enable those policies.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, track_access: bool) -> Self {
        Self {
            backend,
            track_access,
            meta: DashMap::new(),
            used_bytes: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Store `data` under `key`, recording its size and stored-at tick.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying backend.
    pub async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let size = data.len() as u64;
        self.backend.put(key, &data).await?;

        let now = self.tick();
        if let Some(old) = self.meta.insert(
            key.to_string(),
            ObjectMeta {
                size,
                stored_seq: now,
                last_access_seq: now,
                access_count: 0,
            },
        ) {
            self.used_bytes.fetch_sub(old.size, Ordering::Relaxed);
        }
        self.used_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    /// Read `key`, updating access-tracking metadata if enabled.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying backend, including
    /// [`ferry_core::error::Error::NotFound`].
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let data = self.backend.get(key).await?;
        if self.track_access {
            let now = self.tick();
            if let Some(mut entry) = self.meta.get_mut(key) {
                entry.last_access_seq = now;
                entry.access_count += 1;
            }
        }
        Ok(data)
    }

    /// Remove `key` from both the backend and the usage ledger.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying backend.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await?;
        if let Some((_, meta)) = self.meta.remove(key) {
            self.used_bytes.fetch_sub(meta.size, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Total bytes tracked across every known object.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    /// Number of distinct objects tracked.
    #[must_use]
    pub fn file_count(&self) -> u64 {
        self.meta.len() as u64
    }

    /// A point-in-time copy of every tracked object's metadata, for
    /// [`crate::policy::PolicyEngine`] to rank.
    #[must_use]
    pub fn meta_snapshot(&self) -> Vec<(String, ObjectMeta)> {
        self.meta
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Access to the underlying backend, for callers that need operations
    /// the manager does not track usage for (e.g. `list`/`stat`/`exists`).
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}
