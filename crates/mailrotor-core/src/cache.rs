//! Quota cache and per-key locking
//!
//! The cache stores derived counter values with a short TTL; it is never
//! authoritative and is rebuilt from the usage log on miss. The lock
//! registry hands out per-key mutexes with an acquisition timeout so that
//! counter read/decrement serializes per server+period.

use async_trait::async_trait;
use mailrotor_common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Counter cache trait: get/set-with-TTL over a Redis-like store.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process cache with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (i64, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Called opportunistically; correctness does
    /// not depend on it since reads check expiry themselves.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| *value))
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// Per-key mutex registry with acquisition timeout.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting at most `timeout`. Returns
    /// `None` on timeout; callers treat that as zero remaining quota.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        tokio::time::timeout(timeout, lock.lock_owned()).await.ok()
    }

    /// Drop lock entries nobody holds. The registry only grows with the
    /// set of server+period keys, so this is housekeeping, not pressure
    /// relief.
    pub async fn prune(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
    }
}
