use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::pressure::{PressureLevel, PressureThresholds};

/// Estimated memory held by live blocks, and the pressure level derived
/// from it.
pub struct MemoryUsage {
    limit: RwLock<Option<usize>>,
    current_usage: AtomicUsize,
    active_blocks: AtomicUsize,
    thresholds: PressureThresholds,
    level: Mutex<PressureLevel>,
}

impl MemoryUsage {
    pub fn new(limit: Option<usize>, thresholds: PressureThresholds) -> Arc<Self> {
        Arc::new(Self {
            limit: RwLock::new(limit),
            current_usage: AtomicUsize::new(0),
            active_blocks: AtomicUsize::new(0),
            thresholds,
            level: Mutex::new(PressureLevel::None),
        })
    }

    pub fn allocate(&self, bytes: usize) {
        self.current_usage.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .current_usage
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub(crate) fn block_registered(&self, memory_cost: usize) {
        self.active_blocks.fetch_add(1, Ordering::SeqCst);
        self.allocate(memory_cost);
    }

    pub(crate) fn block_finalized(&self, memory_cost: usize) {
        let _ = self
            .active_blocks
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |n| n.checked_sub(1));
        self.release(memory_cost);
    }

    pub fn current_usage(&self) -> usize {
        self.current_usage.load(Ordering::Relaxed)
    }

    pub fn active_blocks(&self) -> usize {
        self.active_blocks.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> Option<usize> {
        *self.limit.read()
    }

    pub fn set_limit(&self, limit: Option<usize>) {
        *self.limit.write() = limit;
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }

    /// Returns `usage / limit`, or `None` when no limit is set.
    pub fn usage_ratio(&self) -> Option<f64> {
        match self.limit() {
            Some(0) => Some(f64::INFINITY),
            Some(limit) => Some(self.current_usage() as f64 / limit as f64),
            None => None,
        }
    }

    /// The level the current usage maps to, regardless of the recorded level.
    pub fn computed_level(&self) -> PressureLevel {
        self.usage_ratio()
            .map_or(PressureLevel::None, |ratio| self.thresholds.level_for(ratio))
    }

    /// The most recently recorded level.
    pub fn level(&self) -> PressureLevel {
        *self.level.lock()
    }

    /// Recomputes the level and records it.
    ///
    /// Returns `(previous, current)` if the level changed. Concurrent callers
    /// observe a given transition exactly once.
    pub fn update_level(&self) -> Option<(PressureLevel, PressureLevel)> {
        let mut level = self.level.lock();
        let computed = self.computed_level();
        if computed == *level {
            return None;
        }
        let previous = std::mem::replace(&mut *level, computed);
        Some((previous, computed))
    }
}
