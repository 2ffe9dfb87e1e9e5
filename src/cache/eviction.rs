use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::memory::PressureLevel;

/// Eviction priority of a cached item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CachePriority {
    /// First to go under pressure.
    Low = 0,
    /// Normal items.
    #[default]
    Medium = 1,
    /// Only evicted when nothing lower can make room.
    High = 2,
}

struct CacheItem<V> {
    data: V,
    memory_cost: usize,
    priority: CachePriority,
    last_accessed: Instant,
    #[allow(dead_code)]
    created_at: Instant,
}

impl<V> CacheItem<V> {
    fn is_expired(&self, now: Instant, expiration: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed) > expiration
    }
}

/// Items in least-recently-used order (front is oldest).
struct LruList<K, V> {
    order: VecDeque<K>,
    items: HashMap<K, CacheItem<V>>,
    memory_used: usize,
    max_memory_cost: usize,
    expiration: Duration,
}

impl<K: Eq + Hash + Clone, V> LruList<K, V> {
    fn insert(&mut self, key: K, item: CacheItem<V>) {
        self.memory_used += item.memory_cost;
        self.order.push_back(key.clone());
        self.items.insert(key, item);
    }

    fn remove(&mut self, key: &K) -> Option<CacheItem<V>> {
        let item = self.items.remove(key)?;
        self.order.retain(|k| k != key);
        self.memory_used -= item.memory_cost;
        Some(item)
    }

    fn move_to_back(&mut self, key: &K) {
        if self.items.contains_key(key) {
            self.order.retain(|k| k != key);
            self.order.push_back(key.clone());
        }
    }

    /// Removes every item matching `pred`, pushing the values into `evicted`.
    fn remove_where(
        &mut self,
        mut pred: impl FnMut(&CacheItem<V>) -> bool,
        evicted: &mut Vec<V>,
    ) -> usize {
        let keys: Vec<K> = self
            .order
            .iter()
            .filter(|k| self.items.get(*k).is_some_and(&mut pred))
            .cloned()
            .collect();
        let mut freed = 0;
        for key in keys {
            if let Some(item) = self.remove(&key) {
                freed += item.memory_cost;
                evicted.push(item.data);
            }
        }
        freed
    }

    fn evict_expired(&mut self, now: Instant, evicted: &mut Vec<V>) -> usize {
        let expiration = self.expiration;
        self.remove_where(|item| item.is_expired(now, expiration), evicted)
    }

    /// Evicts in LRU order until `needed` more bytes fit, sparing high
    /// priority items unless nothing else is left.
    fn evict_for(&mut self, needed: usize, evicted: &mut Vec<V>) {
        for spare_high in [true, false] {
            let candidates: Vec<K> = self
                .order
                .iter()
                .filter(|k| {
                    self.items
                        .get(*k)
                        .is_some_and(|item| !spare_high || item.priority != CachePriority::High)
                })
                .cloned()
                .collect();
            for key in candidates {
                if self.memory_used + needed <= self.max_memory_cost {
                    return;
                }
                if let Some(item) = self.remove(&key) {
                    tracing::trace!(
                        "Evicted {:?} cache item ({} bytes)",
                        item.priority,
                        item.memory_cost
                    );
                    evicted.push(item.data);
                }
            }
        }
    }
}

/// A memory-bounded cache with priorities, expiry and LRU eviction.
///
/// Each item carries a caller-estimated memory cost. After every
/// [`put`](Self::put) the summed cost of resident items is within the
/// configured limit. Values removed from the cache are dropped after the
/// internal lock is released, so a value's `Drop` may safely call back into
/// code that uses the cache.
pub struct EvictionCache<K, V> {
    inner: Mutex<LruList<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> EvictionCache<K, V> {
    /// Creates a cache holding at most `max_memory_cost` worth of items,
    /// expiring items untouched for longer than `expiration`.
    pub fn new(max_memory_cost: usize, expiration: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(LruList {
                order: VecDeque::new(),
                items: HashMap::new(),
                memory_used: 0,
                max_memory_cost,
                expiration,
            }),
        })
    }

    /// Inserts `data` under `key`, replacing any previous value.
    ///
    /// Returns false if the item alone exceeds the cache limit; such items
    /// are not cached.
    pub fn put(&self, key: K, data: V, memory_cost: usize, priority: CachePriority) -> bool {
        let now = Instant::now();
        let mut evicted = Vec::new();
        let inserted = {
            let mut list = self.inner.lock();
            if let Some(old) = list.remove(&key) {
                evicted.push(old.data);
            }

            if memory_cost > list.max_memory_cost {
                tracing::trace!(
                    "Skipping cache item of {} bytes (limit {})",
                    memory_cost,
                    list.max_memory_cost
                );
                false
            } else {
                if list.memory_used + memory_cost > list.max_memory_cost {
                    list.evict_expired(now, &mut evicted);
                }
                if list.memory_used + memory_cost > list.max_memory_cost {
                    list.evict_for(memory_cost, &mut evicted);
                }
                list.insert(
                    key,
                    CacheItem {
                        data,
                        memory_cost,
                        priority,
                        last_accessed: now,
                        created_at: now,
                    },
                );
                true
            }
        };
        drop(evicted);
        inserted
    }

    /// Returns the value for `key`, refreshing its access time.
    ///
    /// Expired items are removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut list = self.inner.lock();
        let expiration = list.expiration;
        let expired = list.items.get(key)?.is_expired(now, expiration);
        if expired {
            let stale = list.remove(key);
            drop(list);
            drop(stale);
            return None;
        }

        list.move_to_back(key);
        let item = list.items.get_mut(key)?;
        item.last_accessed = now;
        Some(item.data.clone())
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        let item = self.inner.lock().remove(key);
        item.map(|item| item.data)
    }

    /// Returns true if `key` is cached and not expired. Does not refresh it.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        let list = self.inner.lock();
        list.items
            .get(key)
            .is_some_and(|item| !item.is_expired(now, list.expiration))
    }

    /// Removes expired items. Returns the cost freed.
    pub fn evict_expired(&self) -> usize {
        let mut evicted = Vec::new();
        let freed = self.inner.lock().evict_expired(Instant::now(), &mut evicted);
        drop(evicted);
        freed
    }

    /// Trims the cache for the given pressure level. Returns the cost freed.
    ///
    /// | level | removes |
    /// |---|---|
    /// | `None` | expired items |
    /// | `Low` | expired and low priority items |
    /// | `Medium` | expired, low and medium priority items |
    /// | `High`, `Critical` | everything |
    pub fn clear_by_pressure_level(&self, level: PressureLevel) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();
        let freed = {
            let mut list = self.inner.lock();
            let expiration = list.expiration;
            let ceiling = match level {
                PressureLevel::None => None,
                PressureLevel::Low => Some(CachePriority::Low),
                PressureLevel::Medium => Some(CachePriority::Medium),
                PressureLevel::High | PressureLevel::Critical => Some(CachePriority::High),
            };
            list.remove_where(
                |item| {
                    item.is_expired(now, expiration)
                        || ceiling.is_some_and(|ceiling| item.priority <= ceiling)
                },
                &mut evicted,
            )
        };
        if freed > 0 {
            tracing::debug!(
                "Cache trimmed for {} pressure: {} items, {} bytes",
                level,
                evicted.len(),
                freed
            );
        }
        drop(evicted);
        freed
    }

    /// Removes every item.
    pub fn clear(&self) {
        let items = {
            let mut list = self.inner.lock();
            list.order.clear();
            list.memory_used = 0;
            std::mem::take(&mut list.items)
        };
        drop(items);
    }

    /// Returns the summed cost of resident items.
    pub fn memory_used(&self) -> usize {
        self.inner.lock().memory_used
    }

    /// Returns the cost limit.
    pub fn max_memory_cost(&self) -> usize {
        self.inner.lock().max_memory_cost
    }

    /// Changes the cost limit, evicting as needed to fit under it.
    pub fn set_max_memory_cost(&self, max_memory_cost: usize) {
        let mut evicted = Vec::new();
        {
            let mut list = self.inner.lock();
            list.max_memory_cost = max_memory_cost;
            if list.memory_used > max_memory_cost {
                list.evict_expired(Instant::now(), &mut evicted);
                list.evict_for(0, &mut evicted);
            }
        }
        drop(evicted);
    }

    /// Returns the expiration age.
    pub fn expiration(&self) -> Duration {
        self.inner.lock().expiration
    }

    /// Changes the expiration age. Takes effect on the next access or sweep.
    pub fn set_expiration(&self, expiration: Duration) {
        self.inner.lock().expiration = expiration;
    }

    /// Returns the number of resident items, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
