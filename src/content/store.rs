use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::hash::{content_hash, ContentKey, HashStrategy};

struct ContentEntry {
    serial: u32,
    data: Bytes,
    ref_count: usize,
}

/// All entries sharing one content hash. More than one entry means the
/// hash collided for different bytes.
#[derive(Default)]
struct Bucket {
    entries: Vec<ContentEntry>,
    next_serial: u32,
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<Arc<str>, Bucket>,
    saved_memory: usize,
    duplicate_count: usize,
}

/// The outcome of [`ContentStore::store`].
#[derive(Debug, Clone)]
pub struct StoredContent {
    /// Key to release the reference with. `None` for empty buffers, which
    /// are not tracked.
    pub key: Option<ContentKey>,
    /// The canonical buffer. For duplicates this is the buffer stored first,
    /// not the one passed in.
    pub data: Bytes,
}

/// A summary of deduplication state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeduplicationReport {
    /// Number of distinct contents stored.
    pub unique_block_count: usize,
    /// Bytes held by distinct contents.
    pub total_bytes: usize,
    /// Sum of all reference counts.
    pub total_ref_count: usize,
    /// Bytes not allocated because a store was served by an existing
    /// entry. Accumulates over the store's lifetime.
    pub total_saved_memory: usize,
    /// Number of stores that were served by an existing entry. Accumulates
    /// over the store's lifetime.
    pub duplicate_block_count: usize,
}

/// Content-addressable, reference-counted buffer store.
///
/// Identical buffers stored through the same `ContentStore` share a single
/// allocation. Entries are keyed by a content hash, but a buffer is only
/// treated as a duplicate after a full byte comparison.
pub struct ContentStore {
    state: Mutex<StoreState>,
    strategy: HashStrategy,
}

impl ContentStore {
    /// Creates an empty store.
    pub fn new(strategy: HashStrategy) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState::default()),
            strategy,
        })
    }

    /// Returns the hash strategy in use.
    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    /// Stores `data`, returning the canonical buffer and its key.
    ///
    /// Empty buffers are passed through untouched.
    pub fn store(&self, data: Bytes) -> StoredContent {
        if data.is_empty() {
            return StoredContent { key: None, data };
        }

        let hash: Arc<str> = Arc::from(content_hash(&data, self.strategy));
        let mut state = self.state.lock();
        let StoreState {
            buckets,
            saved_memory,
            duplicate_count,
        } = &mut *state;
        let bucket = buckets.entry(hash.clone()).or_default();

        if let Some(entry) = bucket.entries.iter_mut().find(|e| e.data == data) {
            entry.ref_count += 1;
            *saved_memory += data.len();
            *duplicate_count += 1;
            tracing::trace!(
                "Deduplicated {} bytes into {} (refs: {})",
                data.len(),
                hash,
                entry.ref_count
            );
            return StoredContent {
                key: Some(ContentKey::new(hash, entry.serial)),
                data: entry.data.clone(),
            };
        }

        let serial = bucket.next_serial;
        bucket.next_serial += 1;
        if serial > 0 {
            tracing::debug!("Content hash collision on {}, using serial {}", hash, serial);
        }
        bucket.entries.push(ContentEntry {
            serial,
            data: data.clone(),
            ref_count: 1,
        });

        StoredContent {
            key: Some(ContentKey::new(hash, serial)),
            data,
        }
    }

    /// Drops one reference to `key`, removing the entry when none remain.
    ///
    /// Returns the number of bytes freed by the store (0 while other
    /// references remain or if the key is unknown).
    pub fn release(&self, key: &ContentKey) -> usize {
        let mut state = self.state.lock();
        let buckets = &mut state.buckets;
        let Some(bucket) = buckets.get_mut(key.hash_arc()) else {
            tracing::trace!("Release of unknown content {}", key);
            return 0;
        };
        let Some(pos) = bucket.entries.iter().position(|e| e.serial == key.serial()) else {
            tracing::trace!("Release of unknown content {}", key);
            return 0;
        };

        let entry = &mut bucket.entries[pos];
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return 0;
        }

        let removed = bucket.entries.swap_remove(pos);
        if bucket.entries.is_empty() {
            buckets.remove(key.hash_arc());
        }
        removed.data.len()
    }

    /// Removes entries whose reference count dropped to zero without being
    /// removed. Returns the bytes reclaimed.
    pub fn clean_unreferenced_data(&self) -> usize {
        let mut state = self.state.lock();
        let mut freed = 0;
        state.buckets.retain(|_, bucket| {
            bucket.entries.retain(|entry| {
                if entry.ref_count == 0 {
                    freed += entry.data.len();
                    false
                } else {
                    true
                }
            });
            !bucket.entries.is_empty()
        });
        freed
    }

    /// Returns the reference count of `key`, if stored.
    pub fn ref_count(&self, key: &ContentKey) -> Option<usize> {
        let state = self.state.lock();
        state
            .buckets
            .get(key.hash_arc())?
            .entries
            .iter()
            .find(|e| e.serial == key.serial())
            .map(|e| e.ref_count)
    }

    /// Returns true if `key` is stored.
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.ref_count(key).is_some()
    }

    /// Returns the number of distinct contents stored.
    pub fn len(&self) -> usize {
        self.state.lock().buckets.values().map(|b| b.entries.len()).sum()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.state.lock().buckets.is_empty()
    }

    /// Summarises the current deduplication state.
    ///
    /// Entry counts reflect what is stored now. Saved memory and the
    /// duplicate count are cumulative and do not drop on release.
    pub fn report(&self) -> DeduplicationReport {
        let state = self.state.lock();
        let mut report = DeduplicationReport {
            total_saved_memory: state.saved_memory,
            duplicate_block_count: state.duplicate_count,
            ..DeduplicationReport::default()
        };
        for entry in state.buckets.values().flat_map(|b| b.entries.iter()) {
            report.unique_block_count += 1;
            report.total_bytes += entry.data.len();
            report.total_ref_count += entry.ref_count;
        }
        report
    }

    #[cfg(test)]
    pub(crate) fn set_ref_count(&self, key: &ContentKey, ref_count: usize) {
        let mut state = self.state.lock();
        if let Some(entry) = state
            .buckets
            .get_mut(key.hash_arc())
            .and_then(|b| b.entries.iter_mut().find(|e| e.serial == key.serial()))
        {
            entry.ref_count = ref_count;
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_colliding(&self, hash: &str, data: Bytes) -> ContentKey {
        let hash: Arc<str> = Arc::from(hash);
        let mut state = self.state.lock();
        let bucket = state.buckets.entry(hash.clone()).or_default();
        let serial = bucket.next_serial;
        bucket.next_serial += 1;
        bucket.entries.push(ContentEntry {
            serial,
            data,
            ref_count: 1,
        });
        ContentKey::new(hash, serial)
    }
}
