//! Generic in-memory key-value cache with per-entry expiration.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

/// A snapshot of a cached entry as handed out by [`ExpiringCache::get`].
///
/// Entries are returned by value; the cache never exposes mutable references
/// to its internal state.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V, M> {
    key: K,
    value: V,
    meta: M,
    created_at: Instant,
    expires_at: Instant,
}

impl<K, V, M> CacheEntry<K, V, M> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn meta(&self) -> &M {
        &self.meta
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

struct StoredEntry<V, M> {
    value: V,
    meta: M,
    created_at: Instant,
    expires_at: Instant,
    order_key: (Instant, u64),
}

struct Inner<K, V, M> {
    by_key: HashMap<K, StoredEntry<V, M>>,
    // smallest expiration first; the sequence number disambiguates entries
    // sharing the same deadline
    by_expiration: BTreeMap<(Instant, u64), K>,
    next_maintenance: Instant,
    sequence: u64,
}

/// Key-value store whose entries expire individually.
///
/// Entries are indexed both by key and by expiration time so that
/// [`maintain`](Self::maintain) can stop sweeping as soon as it reaches the
/// first entry that has not expired yet. Maintenance also runs automatically
/// during `add`/`get` once the configured interval has elapsed, amortizing
/// cleanup without a dedicated background task.
///
/// All public methods are mutually exclusive; the critical sections are short
/// and keep the two indices trivially consistent.
pub struct ExpiringCache<K, V, M> {
    maintenance_interval: Duration,
    inner: Mutex<Inner<K, V, M>>,
}

impl<K, V, M> ExpiringCache<K, V, M>
where
    K: Eq + Hash + Clone,
    V: Clone,
    M: Clone,
{
    pub fn new(maintenance_interval: Duration) -> Self {
        Self {
            maintenance_interval,
            inner: Mutex::new(Inner {
                by_key: HashMap::new(),
                by_expiration: BTreeMap::new(),
                next_maintenance: Instant::now() + maintenance_interval,
                sequence: 0,
            }),
        }
    }

    /// Inserts or replaces the entry for `key`, expiring after `ttl`.
    /// Replacing an entry also drops its old position in the expiration
    /// index so no stale ordering entry lingers.
    pub fn add(&self, key: K, value: V, meta: M, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();

        let now = Instant::now();
        let expires_at = now + ttl;
        let order_key = (expires_at, inner.sequence);
        inner.sequence += 1;

        let previous = inner.by_key.insert(
            key.clone(),
            StoredEntry {
                value,
                meta,
                created_at: now,
                expires_at,
                order_key,
            },
        );
        if let Some(previous) = previous {
            inner.by_expiration.remove(&previous.order_key);
        }
        inner.by_expiration.insert(order_key, key);

        self.auto_maintain(&mut inner);
    }

    /// Returns the entry for `key` unless it has expired, in which case the
    /// entry is evicted and `None` is returned.
    pub fn get(&self, key: &K) -> Option<CacheEntry<K, V, M>> {
        let mut inner = self.inner.lock().unwrap();

        self.auto_maintain(&mut inner);

        let expired = match inner.by_key.get(key) {
            Some(stored) => stored.expires_at < Instant::now(),
            None => return None,
        };

        if expired {
            trace!("queried cache entry has expired, removing");
            let stored = inner.by_key.remove(key).unwrap();
            inner.by_expiration.remove(&stored.order_key);
            return None;
        }

        let stored = inner.by_key.get(key).unwrap();
        Some(CacheEntry {
            key: key.clone(),
            value: stored.value.clone(),
            meta: stored.meta.clone(),
            created_at: stored.created_at,
            expires_at: stored.expires_at,
        })
    }

    /// Sweeps all expired entries from both indices, regardless of whether
    /// they are ever queried again.
    pub fn maintain(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.maintain_locked(&mut inner);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        trace!("clearing cache");
        inner.by_key.clear();
        inner.by_expiration.clear();
        inner.next_maintenance = Instant::now() + self.maintenance_interval;
    }

    fn auto_maintain(&self, inner: &mut Inner<K, V, M>) {
        if Instant::now() <= inner.next_maintenance {
            return;
        }
        trace!("performing automated cache maintenance");
        self.maintain_locked(inner);
    }

    fn maintain_locked(&self, inner: &mut Inner<K, V, M>) {
        let now = Instant::now();

        while let Some((&(expires_at, _), _)) = inner.by_expiration.iter().next() {
            if expires_at >= now {
                // ascending order: everything after this is still alive
                break;
            }

            let (order_key, key) = inner.by_expiration.pop_first().unwrap();
            if let Some(stored) = inner.by_key.get(&key) {
                if stored.order_key == order_key {
                    inner.by_key.remove(&key);
                }
            }
        }

        inner.next_maintenance = now + self.maintenance_interval;
    }
}
