//! Remote-user presence cache with sliding expiration.
//!
//! Tracks which node hosts the session of accounts we talk to across the
//! cluster. Entries live for a TTL that slides on read: a lookup marks the
//! entry recently-used, and the expiry timer, instead of evicting, re-arms
//! itself once when it finds the entry was touched. Timer tasks never hold
//! the map lock across an await, and a timer that fires against an entry
//! that was replaced or erased detects the mismatch and does nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;
use tracing::debug;

/// Authoritative account location lookup, consulted on cache miss.
///
/// Typically backed by the same external store the directory uses, keyed by
/// account rather than party.
#[async_trait]
pub trait AccountLocator: Send + Sync {
    /// Resolve the node currently hosting `account_id`'s session, if any.
    async fn locate(&self, account_id: &str) -> Option<String>;
}

struct CacheEntry {
    location: String,
    /// Set on insert and re-set when a timer finds the entry untouched;
    /// cleared by reads and overwrites. A firing timer evicts while this
    /// is set.
    needs_expiry: bool,
}

struct PendingTimer {
    id: u64,
    abort: AbortHandle,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    pending_timers: Vec<PendingTimer>,
}

/// Account → node presence cache.
pub struct RemoteUserCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    next_timer_id: AtomicU64,
    locator: Arc<dyn AccountLocator>,
}

impl RemoteUserCache {
    pub fn new(locator: Arc<dyn AccountLocator>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
            next_timer_id: AtomicU64::new(0),
            locator,
        })
    }

    /// Record that `account_id` is hosted on `location` and arm an expiry
    /// timer for the entry.
    ///
    /// A fresh entry starts marked for expiry; an overwrite of an existing
    /// entry clears the mark, so the entry survives at least one more full
    /// TTL. Every call arms its own timer; superseded timers discover the
    /// mismatch when they fire.
    pub fn set_user(self: &Arc<Self>, account_id: &str, location: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .entries
                .entry(account_id.to_owned())
                .and_modify(|e| {
                    e.location = location.to_owned();
                    e.needs_expiry = false;
                })
                .or_insert_with(|| CacheEntry {
                    location: location.to_owned(),
                    needs_expiry: true,
                });
        }
        self.arm_timer(account_id.to_owned(), location.to_owned());
    }

    /// Look up the node hosting `account_id`.
    ///
    /// A hit refreshes the entry (clears its expiry mark) and returns the
    /// cached location. On miss the locator is consulted; a resolved
    /// location is cached before being returned. Unresolvable accounts are
    /// not negatively cached.
    pub async fn find(self: &Arc<Self>, account_id: &str) -> Option<String> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(entry) = inner.entries.get_mut(account_id) {
                entry.needs_expiry = false;
                return Some(entry.location.clone());
            }
        }

        let location = self.locator.locate(account_id).await?;
        self.set_user(account_id, &location);
        Some(location)
    }

    /// Drop the entry for `account_id` immediately.
    ///
    /// Used when an authoritative source contradicts the cache (a send to
    /// the cached node bounced, or the account logged out). Timers already
    /// armed for the entry fire harmlessly.
    pub fn erase_user(&self, account_id: &str) {
        self.inner.lock().unwrap().entries.remove(account_id);
    }

    /// Abort every armed expiry timer. Called at shutdown so timer tasks do
    /// not outlive the service.
    pub fn cancel_not_expired_timers(&self) {
        let timers = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.pending_timers)
        };
        for timer in timers {
            timer.abort.abort();
        }
    }

    fn arm_timer(self: &Arc<Self>, account_id: String, location: String) {
        let id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        let cache = Arc::clone(self);
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            cache.on_cache_expired(id, &account_id, &location);
        });
        self.inner.lock().unwrap().pending_timers.push(PendingTimer {
            id,
            abort: handle.abort_handle(),
        });
    }

    /// One expiry timer firing for the entry it was armed against.
    ///
    /// Stale timers (entry gone, or pointing at a different node) no-op.
    /// An entry touched since the timer was armed is re-marked and given
    /// one more TTL; a marked entry is evicted, so a never-touched insert
    /// is gone at the first firing. Public so the expiry path can be
    /// driven directly in tests.
    pub fn on_cache_expired(self: &Arc<Self>, timer_id: u64, account_id: &str, location: &str) {
        let rearm = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending_timers.retain(|t| t.id != timer_id);

            match inner.entries.get_mut(account_id) {
                None => return,
                Some(entry) if entry.location != location => {
                    debug!(account_id, "presence cache: stale expiry timer ignored");
                    return;
                }
                Some(entry) if !entry.needs_expiry => {
                    // Touched since this timer was armed; give it another TTL.
                    entry.needs_expiry = true;
                    true
                }
                Some(_) => {
                    debug!(account_id, "presence cache: entry expired");
                    inner.entries.remove(account_id);
                    false
                }
            }
        };
        if rearm {
            self.arm_timer(account_id.to_owned(), location.to_owned());
        }
    }

    #[cfg(test)]
    fn pending_timer_count(&self) -> usize {
        self.inner.lock().unwrap().pending_timers.len()
    }

    #[cfg(test)]
    fn peek(&self, account_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(account_id)
            .map(|e| e.location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Locator with a fixed answer and a call counter.
    struct FixedLocator {
        answer: Option<String>,
        calls: AtomicU32,
    }

    impl FixedLocator {
        fn some(location: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Some(location.to_owned()),
                calls: AtomicU32::new(0),
            })
        }

        fn none() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AccountLocator for FixedLocator {
        async fn locate(&self, _account_id: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn hit_does_not_consult_locator() {
        let locator = FixedLocator::some("node-b");
        let cache = RemoteUserCache::new(locator.clone(), TTL);

        cache.set_user("bob", "node-a");
        assert_eq!(cache.find("bob").await.as_deref(), Some("node-a"));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 0);
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn miss_consults_locator_and_caches() {
        let locator = FixedLocator::some("node-b");
        let cache = RemoteUserCache::new(locator.clone(), TTL);

        assert_eq!(cache.find("bob").await.as_deref(), Some("node-b"));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);

        // Second lookup is served from the cache.
        assert_eq!(cache.find("bob").await.as_deref(), Some("node-b"));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn unresolvable_account_is_not_negatively_cached() {
        let locator = FixedLocator::none();
        let cache = RemoteUserCache::new(locator.clone(), TTL);

        assert_eq!(cache.find("ghost").await, None);
        assert_eq!(cache.find("ghost").await, None);
        // Each miss retried the locator.
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn untouched_fresh_entry_evicts_on_first_firing() {
        let cache = RemoteUserCache::new(FixedLocator::none(), TTL);
        cache.set_user("bob", "node-a");

        // Inserted marked; a firing with no intervening touch evicts.
        cache.on_cache_expired(0, "bob", "node-a");
        assert_eq!(cache.peek("bob"), None);
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn read_slides_the_expiration_window() {
        let cache = RemoteUserCache::new(FixedLocator::none(), TTL);
        cache.set_user("bob", "node-a");
        cache.find("bob").await; // touch clears the insert mark

        cache.on_cache_expired(0, "bob", "node-a"); // re-marks, no evict
        assert_eq!(cache.peek("bob").as_deref(), Some("node-a"));

        cache.find("bob").await; // touched again
        cache.on_cache_expired(1, "bob", "node-a"); // still survives
        assert_eq!(cache.peek("bob").as_deref(), Some("node-a"));

        cache.on_cache_expired(2, "bob", "node-a"); // untouched now: evicts
        assert_eq!(cache.peek("bob"), None);
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn stale_timer_for_replaced_location_is_harmless() {
        let cache = RemoteUserCache::new(FixedLocator::none(), TTL);
        cache.set_user("bob", "node-a");
        cache.set_user("bob", "node-b"); // moved

        // Timer armed for the node-a generation fires: location mismatch.
        cache.on_cache_expired(0, "bob", "node-a");
        assert_eq!(cache.peek("bob").as_deref(), Some("node-b"));
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn stale_timer_for_erased_entry_is_harmless() {
        let cache = RemoteUserCache::new(FixedLocator::none(), TTL);
        cache.set_user("bob", "node-a");
        cache.erase_user("bob");

        cache.on_cache_expired(0, "bob", "node-a");
        assert_eq!(cache.peek("bob"), None);
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn overwrite_clears_the_expiry_mark() {
        let cache = RemoteUserCache::new(FixedLocator::none(), TTL);
        cache.set_user("bob", "node-a");
        cache.set_user("bob", "node-a"); // overwrite clears the insert mark

        cache.on_cache_expired(0, "bob", "node-a"); // re-marks, no evict
        assert_eq!(cache.peek("bob").as_deref(), Some("node-a"));

        cache.on_cache_expired(1, "bob", "node-a"); // untouched now: evicts
        assert_eq!(cache.peek("bob"), None);
        cache.cancel_not_expired_timers();
    }

    #[tokio::test]
    async fn fired_timer_removes_its_pending_entry() {
        let cache = RemoteUserCache::new(FixedLocator::none(), TTL);
        cache.set_user("bob", "node-a");
        cache.find("bob").await; // keep the entry alive past one firing
        assert_eq!(cache.pending_timer_count(), 1);

        // Drive the armed timer's id by hand; the re-armed replacement is
        // the only one left pending.
        cache.on_cache_expired(0, "bob", "node-a");
        assert_eq!(cache.pending_timer_count(), 1);

        // The next firing evicts and arms nothing.
        cache.on_cache_expired(1, "bob", "node-a");
        assert_eq!(cache.pending_timer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_through_the_clock() {
        let cache = RemoteUserCache::new(FixedLocator::none(), Duration::from_secs(300));
        cache.set_user("bob", "node-a");

        // A never-read entry is gone after one TTL.
        tokio::time::sleep(Duration::from_secs(301)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.peek("bob"), None);
        assert_eq!(cache.pending_timer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_buys_another_ttl_through_the_clock() {
        let cache = RemoteUserCache::new(FixedLocator::none(), Duration::from_secs(300));
        cache.set_user("bob", "node-a");

        // Touched mid-window: the 300s firing re-arms instead of evicting.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(cache.find("bob").await.as_deref(), Some("node-a"));

        tokio::time::sleep(Duration::from_secs(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.peek("bob").as_deref(), Some("node-a"));

        // The replacement timer evicts one full TTL later.
        tokio::time::sleep(Duration::from_secs(300)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.peek("bob"), None);
        assert_eq!(cache.pending_timer_count(), 0);
    }
}
