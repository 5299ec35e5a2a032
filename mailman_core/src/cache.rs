//! In-memory cache whose entries expire at an absolute instant.
//!
//! Every entry carries its own expiry, chosen by the caller when it is stored. Expired entries are
//! never returned, and a background sweep removes them so that keys which are no longer asked for
//! do not pile up. An optional capacity evicts the least recently set entry.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug},
    hash::Hash,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::debug;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Expired,
    CapacityReached,
    Deleted,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvictionReason::Expired => "expired",
            EvictionReason::CapacityReached => "capacity reached",
            EvictionReason::Deleted => "deleted",
        })
    }
}

/// Observer of cache state changes. Called after the cache lock has been released.
pub trait CacheListener<K>: Send + Sync {
    fn on_insertion(&self, _key: &K, _expires_at: DateTime<Utc>) {}

    fn on_eviction(&self, _key: &K, _reason: EvictionReason) {}
}

/// Logs insertions and evictions.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl<K: fmt::Display> CacheListener<K> for LogListener {
    fn on_insertion(&self, key: &K, expires_at: DateTime<Utc>) {
        debug!(subsystem = "cache", item = %key, %expires_at, "insertion");
    }

    fn on_eviction(&self, key: &K, reason: EvictionReason) {
        debug!(subsystem = "cache", item = %key, %reason, "eviction");
    }
}

struct Entry<V> {
    value: Arc<V>,
    expires_at: DateTime<Utc>,
    set_order: u64,
}

struct Store<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Keys by the order in which they were last set.
    order: BTreeMap<u64, K>,
    next_order: u64,
}

impl<K: Eq + Hash + Clone, V> Store<K, V> {
    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.set_order);
        Some(entry)
    }
}

pub struct ExpiringCache<K, V> {
    store: Mutex<Store<K, V>>,
    capacity: Option<NonZeroUsize>,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn CacheListener<K>>,
}

impl<K, V> Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("capacity", &self.capacity)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(capacity: Option<NonZeroUsize>, clock: Arc<dyn Clock>) -> Self {
        ExpiringCache {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_order: 0,
            }),
            capacity,
            clock,
            listener: Arc::new(LogListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn CacheListener<K>>) -> Self {
        self.listener = listener;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Store<K, V>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    /// The stored value, unless it has expired.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = self.now();
        let store = self.lock();
        store
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// The expiry of the stored value, unless it has expired.
    pub fn expires_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let now = self.now();
        let store = self.lock();
        store
            .entries
            .get(key)
            .map(|entry| entry.expires_at)
            .filter(|expires_at| *expires_at > now)
    }

    /// Store `value` until `expires_at`, replacing whatever was stored for `key`.
    pub fn set(&self, key: K, value: impl Into<Arc<V>>, expires_at: DateTime<Utc>) {
        let mut evicted = Vec::new();
        {
            let mut store = self.lock();
            store.remove(&key);
            let set_order = store.next_order;
            store.next_order += 1;
            store.order.insert(set_order, key.clone());
            store.entries.insert(
                key.clone(),
                Entry {
                    value: value.into(),
                    expires_at,
                    set_order,
                },
            );
            if let Some(capacity) = self.capacity {
                while store.entries.len() > capacity.get() {
                    let Some((_, oldest)) = store.order.pop_first() else {
                        break;
                    };
                    store.entries.remove(&oldest);
                    evicted.push(oldest);
                }
            }
        }
        self.listener.on_insertion(&key, expires_at);
        for key in evicted {
            self.listener.on_eviction(&key, EvictionReason::CapacityReached);
        }
    }

    /// Remove the value stored for `key`. Returns whether there was one.
    pub fn delete(&self, key: &K) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.listener.on_eviction(key, EvictionReason::Deleted);
        }
        removed
    }

    /// Number of stored entries, expired ones that were not swept yet included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry that has expired by now. Returns how many were removed.
    ///
    /// Expiry is checked under the same lock that `set` takes, so an entry written concurrently
    /// is either seen with its new expiry or not seen at all.
    pub fn sweep_expired(&self) -> usize {
        let now = self.now();
        let expired: Vec<K> = {
            let mut store = self.lock();
            let keys: Vec<K> = store
                .entries
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                store.remove(key);
            }
            keys
        };
        for key in &expired {
            self.listener.on_eviction(key, EvictionReason::Expired);
        }
        expired.len()
    }

    /// Sweep expired entries every `every` on the tokio runtime.
    ///
    /// The task stops once the cache has been dropped, or when the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticks = interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let swept = cache.sweep_expired();
                if swept > 0 {
                    debug!(subsystem = "cache", swept, "swept expired entries");
                }
            }
        })
    }
}
