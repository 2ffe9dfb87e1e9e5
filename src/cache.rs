//! Memory-bounded caching of derived values.
//!
//! This module provides [`EvictionCache`], a generic cache that bounds its
//! contents by an estimated memory cost rather than an item count. Blocks use
//! it to memoize lookups (see [`Block::cache`](crate::Block::cache)), and the
//! pressure state machine trims it when memory gets tight.
//!
//! # Eviction order
//!
//! When an insert would exceed the limit, the cache frees space in this
//! order:
//!
//! 1. Items not accessed within the expiration age, at any priority.
//! 2. Remaining items from least to most recently used, skipping
//!    [`CachePriority::High`] items.
//! 3. High priority items, least recently used first, only if the first two
//!    steps did not free enough.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use rblob::cache::{CachePriority, EvictionCache};
//!
//! let cache = EvictionCache::new(10, Duration::from_secs(60));
//! cache.put("a", 1, 6, CachePriority::Low);
//! cache.put("b", 2, 6, CachePriority::Medium);
//!
//! assert_eq!(cache.get(&"a"), None);
//! assert_eq!(cache.get(&"b"), Some(2));
//! assert!(cache.memory_used() <= 10);
//! ```

mod eviction;

pub use eviction::{CachePriority, EvictionCache};
