use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::block::BlockId;
use crate::content::{ContentKey, ContentStore};
use crate::memory::MemoryUsage;

/// A non-owning handle used to check whether a tracked block is still alive.
pub type LivenessHandle = Weak<dyn Any + Send + Sync>;

/// Bookkeeping for one live block.
#[derive(Debug, Clone)]
pub struct TrackingInfo {
    pub block_id: BlockId,
    /// Content store references held by the block, one per stored buffer.
    pub data_ids: Vec<ContentKey>,
    pub memory_cost: usize,
    pub last_access: Instant,
}

struct TrackedBlock {
    handle: LivenessHandle,
    info: TrackingInfo,
}

/// Result of [`LifecycleTracker::perform_cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Live blocks not accessed within the stale age.
    pub stale_blocks: usize,
    /// Dead entries that were finalized by this pass.
    pub purged_blocks: usize,
    /// Estimated bytes reclaimed.
    pub bytes_reclaimed: usize,
}

/// Global memory figures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryReport {
    pub total_memory_usage: usize,
    pub active_block_count: usize,
    pub average_block_size: f64,
}

/// Tracks live blocks without keeping them alive.
///
/// Each block registers a [`LivenessHandle`] on construction and calls
/// [`finalize`](Self::finalize) when its last handle is dropped or when it
/// is disposed. Finalization removes the entry first, so it runs at most
/// once per block no matter how many paths reach it.
pub struct LifecycleTracker {
    blocks: DashMap<BlockId, TrackedBlock>,
    store: Arc<ContentStore>,
    usage: Arc<MemoryUsage>,
    stale_after: Duration,
    aggressive_stale_after: Duration,
}

impl LifecycleTracker {
    pub fn new(
        store: Arc<ContentStore>,
        usage: Arc<MemoryUsage>,
        stale_after: Duration,
        aggressive_stale_after: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            blocks: DashMap::new(),
            store,
            usage,
            stale_after,
            aggressive_stale_after,
        })
    }

    /// Starts tracking a block.
    pub fn register(
        &self,
        block_id: BlockId,
        handle: LivenessHandle,
        data_ids: Vec<ContentKey>,
        memory_cost: usize,
    ) {
        self.usage.block_registered(memory_cost);
        let info = TrackingInfo {
            block_id,
            data_ids,
            memory_cost,
            last_access: Instant::now(),
        };
        self.blocks.insert(block_id, TrackedBlock { handle, info });
    }

    /// Refreshes a block's last access time.
    pub fn touch(&self, block_id: BlockId) {
        if let Some(mut tracked) = self.blocks.get_mut(&block_id) {
            tracked.info.last_access = Instant::now();
        }
    }

    /// Adds memory cost to a block, e.g. after caching a materialized copy.
    pub fn add_memory_cost(&self, block_id: BlockId, bytes: usize) {
        if let Some(mut tracked) = self.blocks.get_mut(&block_id) {
            tracked.info.memory_cost += bytes;
            tracked.info.last_access = Instant::now();
            self.usage.allocate(bytes);
        }
    }

    /// Records content references acquired after registration.
    ///
    /// Returns false if the block is no longer tracked, in which case the
    /// caller still owns the references and should release them.
    pub fn attach_data(&self, block_id: BlockId, data_ids: Vec<ContentKey>, bytes: usize) -> bool {
        match self.blocks.get_mut(&block_id) {
            Some(mut tracked) => {
                tracked.info.data_ids.extend(data_ids);
                tracked.info.memory_cost += bytes;
                tracked.info.last_access = Instant::now();
                self.usage.allocate(bytes);
                true
            }
            None => false,
        }
    }

    /// Stops tracking a block and releases everything it held.
    ///
    /// Returns the removed info, or `None` if the block was already
    /// finalized.
    pub fn finalize(&self, block_id: BlockId) -> Option<TrackingInfo> {
        let (_, tracked) = self.blocks.remove(&block_id)?;
        self.usage.block_finalized(tracked.info.memory_cost);
        for key in &tracked.info.data_ids {
            self.store.release(key);
        }
        tracing::trace!(
            "Finalized block {} ({} bytes, {} content refs)",
            block_id,
            tracked.info.memory_cost,
            tracked.info.data_ids.len()
        );
        Some(tracked.info)
    }

    /// Sweeps dead entries and unreferenced content.
    ///
    /// Stale blocks are only counted; they are alive and owned elsewhere.
    /// `aggressive` shortens the stale age.
    pub fn perform_cleanup(&self, aggressive: bool) -> CleanupReport {
        let threshold = if aggressive {
            self.aggressive_stale_after
        } else {
            self.stale_after
        };
        let now = Instant::now();

        let mut report = CleanupReport::default();
        let mut dead = Vec::new();
        for tracked in self.blocks.iter() {
            if tracked.handle.strong_count() == 0 {
                dead.push(*tracked.key());
            } else if now.saturating_duration_since(tracked.info.last_access) > threshold {
                report.stale_blocks += 1;
            }
        }

        for block_id in dead {
            if let Some(info) = self.finalize(block_id) {
                report.purged_blocks += 1;
                report.bytes_reclaimed += info.memory_cost;
            }
        }
        report.bytes_reclaimed += self.store.clean_unreferenced_data();

        tracing::debug!(
            "Cleanup (aggressive: {}): {} stale, {} purged, {} bytes reclaimed",
            aggressive,
            report.stale_blocks,
            report.purged_blocks,
            report.bytes_reclaimed
        );
        report
    }

    /// Returns a copy of a block's tracking info.
    pub fn tracking_info(&self, block_id: BlockId) -> Option<TrackingInfo> {
        self.blocks.get(&block_id).map(|tracked| tracked.info.clone())
    }

    pub fn is_tracked(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    /// Returns the number of tracked blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn report(&self) -> MemoryReport {
        let total_memory_usage = self.usage.current_usage();
        let active_block_count = self.blocks.len();
        let average_block_size = if active_block_count == 0 {
            0.0
        } else {
            total_memory_usage as f64 / active_block_count as f64
        };
        MemoryReport {
            total_memory_usage,
            active_block_count,
            average_block_size,
        }
    }
}
