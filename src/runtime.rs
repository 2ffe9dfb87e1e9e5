//! The service bundle blocks are created in.
//!
//! A [`BlockRuntime`] owns one content store, one block cache, one memory
//! accounting state with its pressure subscribers, and one lifecycle
//! tracker. Blocks hold a weak reference back to the runtime that created
//! them, so separate runtimes never share state and dropping a runtime does
//! not wait on its blocks.

mod monitor;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::ReentrantMutex;

use crate::block::{Block, BlockError, BlockId, Result};
use crate::cache::EvictionCache;
use crate::config::RuntimeConfig;
use crate::content::{ContentKey, ContentStore, DeduplicationReport};
use crate::lifecycle::{CleanupReport, LifecycleTracker, LivenessHandle, MemoryReport};
use crate::memory::{MemoryUsage, PressureLevel, PressureSubscribers, PressureSubscription};

pub use monitor::MonitorHandle;

/// State shared between a runtime and the blocks it created.
pub(crate) struct RuntimeShared {
    pub(crate) store: Arc<ContentStore>,
    pub(crate) cache: Arc<EvictionCache<String, Block>>,
    pub(crate) usage: Arc<MemoryUsage>,
    pub(crate) tracker: Arc<LifecycleTracker>,
    pub(crate) subscribers: Arc<PressureSubscribers>,
    /// Held from recording a transition until its subscribers are notified.
    notify_order: ReentrantMutex<()>,
    pub(crate) max_chunk_size: usize,
}

impl RuntimeShared {
    pub(crate) fn register_block(
        &self,
        block_id: BlockId,
        handle: LivenessHandle,
        data_ids: Vec<ContentKey>,
        memory_cost: usize,
    ) {
        self.tracker.register(block_id, handle, data_ids, memory_cost);
        self.refresh_pressure();
    }

    /// Recomputes the pressure level. On a change, notifies subscribers and
    /// reclaims memory for the new level.
    ///
    /// Transitions are delivered to subscribers in the order they were
    /// recorded, even when several threads cross thresholds at once. A
    /// callback may create blocks on its own thread, but must not wait on
    /// another thread that is refreshing pressure.
    pub(crate) fn refresh_pressure(&self) -> PressureLevel {
        let order = self.notify_order.lock();
        let Some((previous, current)) = self.usage.update_level() else {
            return self.usage.level();
        };

        tracing::debug!(
            "Memory pressure {} -> {} ({} bytes in use, limit {:?})",
            previous,
            current,
            self.usage.current_usage(),
            self.usage.limit()
        );
        self.subscribers.notify(current);
        drop(order);
        self.reclaim(current);
        current
    }

    fn reclaim(&self, level: PressureLevel) {
        if level == PressureLevel::None {
            return;
        }

        let cache_freed = self.cache.clear_by_pressure_level(level);
        let store_freed = self.store.clean_unreferenced_data();
        let cleanup =
            (level == PressureLevel::Critical).then(|| self.tracker.perform_cleanup(true));

        tracing::debug!(
            "Reclaimed for {} pressure: cache {} bytes, content {} bytes, tracker {:?}",
            level,
            cache_freed,
            store_freed,
            cleanup
        );
    }
}

/// Entry point for creating blocks and managing their memory.
///
/// Cloning a runtime yields another handle to the same services.
///
/// # Examples
///
/// ```
/// use rblob::{Block, BlockRuntime, PressureLevel, RuntimeConfig};
///
/// let runtime = BlockRuntime::new(RuntimeConfig::default());
/// runtime.set_memory_usage_limit(Some(1000));
///
/// let _block = Block::new(&runtime, vec![vec![0u8; 700].into()], "").unwrap();
/// assert_eq!(runtime.pressure_level(), PressureLevel::Medium);
/// ```
#[derive(Clone)]
pub struct BlockRuntime {
    shared: Arc<RuntimeShared>,
}

impl Default for BlockRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl BlockRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        let store = ContentStore::new(config.hash_strategy);
        let usage = MemoryUsage::new(config.memory_limit, config.thresholds);
        let tracker = LifecycleTracker::new(
            store.clone(),
            usage.clone(),
            config.stale_after,
            config.aggressive_stale_after,
        );

        Self {
            shared: Arc::new(RuntimeShared {
                store,
                cache: EvictionCache::new(config.cache_limit, config.cache_expiration),
                usage,
                tracker,
                subscribers: PressureSubscribers::new(),
                notify_order: ReentrantMutex::new(()),
                max_chunk_size: config.max_chunk_size.max(1),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    /// Returns the content store.
    pub fn content_store(&self) -> &Arc<ContentStore> {
        &self.shared.store
    }

    /// Returns the block cache.
    pub fn cache(&self) -> &Arc<EvictionCache<String, Block>> {
        &self.shared.cache
    }

    /// Returns the lifecycle tracker.
    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.shared.tracker
    }

    /// Returns the memory accounting state.
    pub fn memory_usage(&self) -> &Arc<MemoryUsage> {
        &self.shared.usage
    }

    /// Sets the limit pressure is measured against. `None` disables
    /// pressure. The level is recomputed immediately.
    pub fn set_memory_usage_limit(&self, limit: Option<usize>) {
        self.shared.usage.set_limit(limit);
        self.shared.refresh_pressure();
    }

    /// Changes the cache budget, evicting as needed.
    pub fn set_cache_limit(&self, limit: usize) {
        self.shared.cache.set_max_memory_cost(limit);
    }

    /// Changes how long cached blocks may sit unused.
    pub fn set_cache_expiration_time(&self, expiration: Duration) {
        self.shared.cache.set_expiration(expiration);
    }

    /// Sets `limit` and starts a task that recomputes pressure every
    /// `interval`, running a cleanup pass whenever the level is not `None`.
    ///
    /// Must be called from within a Tokio runtime. The task stops when the
    /// returned handle is stopped or dropped, or when this runtime is
    /// dropped. A zero `interval` is rejected; see
    /// [`DEFAULT_MONITOR_INTERVAL`](crate::constants::DEFAULT_MONITOR_INTERVAL).
    pub fn start_memory_monitor(
        &self,
        interval: Duration,
        limit: Option<usize>,
    ) -> Result<MonitorHandle> {
        if interval.is_zero() {
            return Err(BlockError::InvalidArgument(
                "monitor interval must be non-zero".into(),
            ));
        }
        let handle = monitor::spawn(Arc::downgrade(&self.shared), interval)?;
        self.set_memory_usage_limit(limit);
        Ok(handle)
    }

    /// Calls `callback` whenever pressure changes to `level` or to any
    /// higher level. A `None` subscriber only hears transitions back to
    /// `None`.
    pub fn on_memory_pressure_level<F>(
        &self,
        callback: F,
        level: PressureLevel,
    ) -> PressureSubscription
    where
        F: Fn(PressureLevel) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(level, Arc::new(callback))
    }

    /// Returns the most recently computed pressure level.
    pub fn pressure_level(&self) -> PressureLevel {
        self.shared.usage.level()
    }

    pub fn deduplication_report(&self) -> DeduplicationReport {
        self.shared.store.report()
    }

    pub fn global_memory_report(&self) -> MemoryReport {
        self.shared.tracker.report()
    }

    /// Expires idle cache entries and runs a tracker cleanup pass.
    pub fn perform_cleanup(&self, aggressive: bool) -> CleanupReport {
        self.shared.cache.evict_expired();
        self.shared.tracker.perform_cleanup(aggressive)
    }

    /// Returns the block cached under `key`, if any.
    pub fn cached_block(&self, key: &str) -> Option<Block> {
        self.shared.cache.get(&key.to_owned())
    }

    /// Empties the cache, drops every pressure subscription and reclaims
    /// storage of blocks that are already gone.
    ///
    /// Live blocks keep working. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        self.shared.cache.clear();
        self.shared.subscribers.clear();
        let report = self.shared.tracker.perform_cleanup(true);
        tracing::debug!(
            "Block runtime shut down: {} blocks still live, {} bytes reclaimed",
            self.shared.tracker.len(),
            report.bytes_reclaimed
        );
    }
}

#[cfg(test)]
mod tests;
