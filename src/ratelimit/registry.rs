//! Identity-keyed store of token buckets.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::bucket::{Quota, TokenBucket};

/// A registered bucket together with its last activity time.
#[derive(Debug)]
struct Entry {
    bucket: Mutex<TokenBucket>,
    last_seen: Mutex<Instant>,
}

impl Entry {
    fn new(quota: Quota, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new_at(quota, now)),
            last_seen: Mutex::new(now),
        }
    }

    fn touch(&self, now: Instant) {
        let mut last_seen = self.last_seen.lock();
        if now > *last_seen {
            *last_seen = now;
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }
}

/// Shared handle to the bucket registered for one identity.
///
/// Cloning the handle does not clone the bucket; every clone admits against
/// the same token balance.
#[derive(Debug, Clone)]
pub struct BucketHandle {
    entry: Arc<Entry>,
}

impl BucketHandle {
    /// Try to take a token from this identity's bucket.
    pub fn try_admit(&self) -> bool {
        self.entry.bucket.lock().try_admit()
    }

    /// Same as [`BucketHandle::try_admit`] with an explicit clock reading.
    pub fn try_admit_at(&self, now: Instant) -> bool {
        self.entry.bucket.lock().try_admit_at(now)
    }

    /// Tokens available as of the last admit check.
    pub fn tokens(&self) -> f64 {
        self.entry.bucket.lock().tokens()
    }

    /// Whether both handles point at the same registered bucket.
    pub fn same_bucket(&self, other: &BucketHandle) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

/// Concurrent mapping from identity to token bucket.
///
/// Lookups take the map lock in shared mode; only first-sight inserts and
/// removals take it exclusively. Each bucket carries its own lock so that
/// admit checks for one identity are serialized without blocking others.
#[derive(Debug)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    quota: Quota,
}

impl Registry {
    /// Create an empty registry whose buckets use `quota`.
    pub fn new(quota: Quota) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota,
        }
    }

    /// Get the bucket for `identity`, creating a full one on first sight, and
    /// mark the identity as active.
    pub fn get_or_create(&self, identity: &str) -> BucketHandle {
        self.get_or_create_at(identity, Instant::now())
    }

    /// Same as [`Registry::get_or_create`] with an explicit clock reading.
    pub fn get_or_create_at(&self, identity: &str, now: Instant) -> BucketHandle {
        let existing = self.entries.read().get(identity).cloned();
        if let Some(entry) = existing {
            entry.touch(now);
            return BucketHandle { entry };
        }

        // Racing creators all land here; the map entry decides the winner and
        // every caller leaves with that single bucket.
        let entry = {
            let mut entries = self.entries.write();
            entries
                .entry(identity.to_owned())
                .or_insert_with(|| {
                    debug!(
                        identity = %identity,
                        capacity = self.quota.capacity(),
                        refill_rate = self.quota.refill_rate(),
                        "Creating new token bucket"
                    );
                    Arc::new(Entry::new(self.quota, now))
                })
                .clone()
        };
        entry.touch(now);

        BucketHandle { entry }
    }

    /// Remove every entry idle for at least `ttl`, returning how many went.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(ttl, Instant::now())
    }

    /// Same as [`Registry::evict_idle`] with an explicit clock reading.
    ///
    /// Candidates are collected under the shared lock and re-checked under
    /// the exclusive one, so an identity touched in between survives. A touch
    /// landing after the re-check is lost along with the entry.
    pub fn evict_idle_at(&self, ttl: Duration, now: Instant) -> usize {
        let expired: Vec<String> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(_, entry)| entry.idle_for(now) >= ttl)
                .map(|(identity, _)| identity.clone())
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write();
        let mut removed = 0;
        for identity in expired {
            let still_idle = entries
                .get(&identity)
                .is_some_and(|entry| entry.idle_for(now) >= ttl);
            if still_idle {
                entries.remove(&identity);
                trace!(identity = %identity, "Evicted idle token bucket");
                removed += 1;
            }
        }

        removed
    }

    /// Remove one identity's bucket, returning whether it existed.
    pub fn remove(&self, identity: &str) -> bool {
        self.entries.write().remove(identity).is_some()
    }

    /// Whether `identity` currently has a bucket.
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.read().contains_key(identity)
    }

    /// Get the number of tracked identities.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }
}
