//! Runtime configuration.

use std::time::Duration;

use crate::constants::{
    AGGRESSIVE_STALE_BLOCK_AGE, DEFAULT_CACHE_EXPIRATION, DEFAULT_CACHE_LIMIT,
    DEFAULT_CHUNK_SIZE, STALE_BLOCK_AGE,
};
use crate::content::HashStrategy;
use crate::memory::PressureThresholds;

/// Settings for a [`BlockRuntime`](crate::BlockRuntime).
///
/// Every field defaults to the matching value in [`constants`](crate::constants).
/// The cache limits and the memory limit can also be changed on a live
/// runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum bytes per chunk of a root block.
    pub max_chunk_size: usize,
    /// How content hashes are computed for deduplication.
    pub hash_strategy: HashStrategy,
    /// Budget of the block cache.
    pub cache_limit: usize,
    /// Idle time after which cached blocks expire.
    pub cache_expiration: Duration,
    /// Memory limit used to compute pressure. `None` disables pressure.
    pub memory_limit: Option<usize>,
    /// Usage ratios at which each pressure level begins.
    pub thresholds: PressureThresholds,
    /// Idle time after which a block counts as stale.
    pub stale_after: Duration,
    /// Stale age used by aggressive cleanup.
    pub aggressive_stale_after: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_CHUNK_SIZE,
            hash_strategy: HashStrategy::default(),
            cache_limit: DEFAULT_CACHE_LIMIT,
            cache_expiration: DEFAULT_CACHE_EXPIRATION,
            memory_limit: None,
            thresholds: PressureThresholds::default(),
            stale_after: STALE_BLOCK_AGE,
            aggressive_stale_after: AGGRESSIVE_STALE_BLOCK_AGE,
        }
    }
}

impl RuntimeConfig {
    /// Sets the maximum chunk size. Values below 1 are raised to 1.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size.max(1);
        self
    }

    pub fn with_hash_strategy(mut self, hash_strategy: HashStrategy) -> Self {
        self.hash_strategy = hash_strategy;
        self
    }

    pub fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit;
        self
    }

    pub fn with_memory_limit(mut self, memory_limit: Option<usize>) -> Self {
        self.memory_limit = memory_limit;
        self
    }
}
