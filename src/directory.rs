//! Party location directory — a thin client over an external expiring
//! key-value store.
//!
//! Every created party publishes a `{prefix}{party_id} → node_id` record so
//! any node in the cluster can resolve which node hosts a party. The record
//! carries a TTL and is best-effort only: it is a cache of "who probably
//! hosts this", never a consensus decision. Callers must tolerate stale or
//! missing records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DirectoryError;

/// Minimal surface of the external expiring key-value store.
///
/// `set_nx` and `expire` are separate operations, matching the store's
/// contract; [`Directory::publish`] handles partial failure of the pair.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` to `value` only if absent. Returns `true` if the key was
    /// written, `false` if it already existed.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, DirectoryError>;

    /// Apply a TTL to an existing key. Returns `false` if the key is gone.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, DirectoryError>;

    /// Read a key. `None` means missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, DirectoryError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), DirectoryError>;
}

/// Client for the party location records.
pub struct Directory {
    store: Arc<dyn KvStore>,
    prefix: String,
    ttl_secs: u64,
}

impl Directory {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl_secs,
        }
    }

    /// Directory key for a party id.
    pub fn key_for(&self, id: Uuid) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Publish `party → node` with the configured TTL.
    ///
    /// Set-if-absent, then expire. If the set succeeds but the TTL apply
    /// fails, the key is deleted before the error is returned, so no record
    /// is ever left without a TTL.
    pub async fn publish(&self, id: Uuid, node_id: &str) -> Result<(), DirectoryError> {
        let key = self.key_for(id);

        if !self.store.set_nx(&key, node_id).await? {
            warn!(%key, "directory: party key already published");
            return Err(DirectoryError::AlreadyPublished(key));
        }

        match self.store.expire(&key, self.ttl_secs).await {
            Ok(true) => {
                info!(%key, node_id, ttl_secs = self.ttl_secs, "directory: party published");
                Ok(())
            }
            Ok(false) => {
                // Key vanished between set and expire. Nothing to clean up.
                warn!(%key, "directory: key disappeared before TTL apply");
                Err(DirectoryError::ExpireFailed(key))
            }
            Err(e) => {
                warn!(%key, "directory: TTL apply failed, removing partial record: {e}");
                if let Err(del_err) = self.store.del(&key).await {
                    warn!(%key, "directory: cleanup delete failed: {del_err}");
                }
                Err(DirectoryError::ExpireFailed(key))
            }
        }
    }

    /// Resolve which node hosts a party. `Ok(None)` means no live record.
    pub async fn lookup(&self, id: Uuid) -> Result<Option<String>, DirectoryError> {
        let value = self.store.get(&self.key_for(id)).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    /// Best-effort removal of a party's record at close. Failure is logged,
    /// not surfaced — the TTL will collect the record regardless.
    pub async fn remove(&self, id: Uuid) {
        let key = self.key_for(id);
        if let Err(e) = self.store.del(&key).await {
            warn!(%key, "directory: record removal failed (TTL will collect it): {e}");
        }
    }
}

/// In-process [`KvStore`] with an explicit millisecond clock.
///
/// Serves single-process deployments and tests. Time only moves when
/// [`MemoryKv::advance_ms`] is called, so TTL behavior is fully
/// deterministic.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    now_ms: AtomicU64,
}

struct MemoryEntry {
    value: String,
    /// Absolute expiry deadline in store-clock milliseconds; `None` = no TTL.
    deadline_ms: Option<u64>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the store clock, expiring any entries whose deadline passed.
    pub fn advance_ms(&self, ms: u64) {
        let now = self.now_ms.fetch_add(ms, Ordering::SeqCst) + ms;
        self.entries
            .lock()
            .unwrap()
            .retain(|_, e| e.deadline_ms.map(|d| d > now).unwrap_or(true));
    }

    fn live<'a>(
        entries: &'a HashMap<String, MemoryEntry>,
        key: &str,
        now: u64,
    ) -> Option<&'a MemoryEntry> {
        entries
            .get(key)
            .filter(|e| e.deadline_ms.map(|d| d > now).unwrap_or(true))
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, DirectoryError> {
        let now = self.now_ms.load(Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            MemoryEntry {
                value: value.to_owned(),
                deadline_ms: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, DirectoryError> {
        let now = self.now_ms.load(Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(e) => {
                e.deadline_ms = Some(now + ttl_secs * 1000);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DirectoryError> {
        let now = self.now_ms.load(Ordering::SeqCst);
        let entries = self.entries.lock().unwrap();
        Ok(Self::live(&entries, key, now).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), DirectoryError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
