//! Storage constants and tuning parameters.
//!
//! This module contains the defaults used throughout the crate: chunk sizes,
//! hashing sample sizes, cache limits, pressure thresholds and cleanup ages.
//!
//! Every value here can be overridden per runtime through
//! [`RuntimeConfig`](crate::RuntimeConfig).

use std::time::Duration;

// ============================================================================
// Chunking
// ============================================================================

/// Maximum size of a single chunk in a root block (512 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Default chunk size yielded by [`Block::stream`](crate::Block::stream) (64 KiB).
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Content hashing
// ============================================================================

/// Buffers smaller than this are hashed in full.
pub const FULL_HASH_THRESHOLD: usize = 1024;

/// Size of each of the head, middle and tail samples for large buffers.
pub const HASH_SAMPLE_SIZE: usize = 512;

/// Separator between a content hash and its collision counter.
pub const COLLISION_SEPARATOR: char = '~';

// ============================================================================
// Eviction cache
// ============================================================================

/// Default cache budget (50 MiB).
pub const DEFAULT_CACHE_LIMIT: usize = 50 * 1024 * 1024;

/// Entries untouched for longer than this are expired (5 minutes).
pub const DEFAULT_CACHE_EXPIRATION: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// Memory pressure
// ============================================================================

/// Usage ratio at or above which pressure is `Low`.
pub const PRESSURE_LOW_RATIO: f64 = 0.45;

/// Usage ratio at or above which pressure is `Medium`.
pub const PRESSURE_MEDIUM_RATIO: f64 = 0.65;

/// Usage ratio at or above which pressure is `High`.
pub const PRESSURE_HIGH_RATIO: f64 = 0.80;

/// Usage ratio at or above which pressure is `Critical`.
pub const PRESSURE_CRITICAL_RATIO: f64 = 0.90;

// ============================================================================
// Lifecycle cleanup
// ============================================================================

/// Blocks not accessed for this long are reported as stale (5 minutes).
pub const STALE_BLOCK_AGE: Duration = Duration::from_secs(5 * 60);

/// Stale age used by aggressive cleanup passes (30 seconds).
pub const AGGRESSIVE_STALE_BLOCK_AGE: Duration = Duration::from_secs(30);

/// Default tick of the background memory monitor.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);
