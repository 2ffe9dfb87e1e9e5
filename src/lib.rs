//! rblob - Immutable byte blocks with deduplicated, pressure-aware storage
//!
//! This library provides [`Block`], an immutable binary container with cheap
//! zero-copy slicing and streaming, on top of a memory layer that shares
//! identical payloads and reclaims storage as blocks go away or memory
//! pressure rises.
//!
//! # Modules
//!
//! - [`content`] - Content-addressable, reference-counted deduplication
//! - [`cache`] - Priority, TTL and LRU eviction cache
//! - [`memory`] - Memory accounting and the pressure state machine
//! - [`lifecycle`] - Weak block tracking, finalization and cleanup
//! - [`constants`] - Default limits and thresholds
//!
//! Blocks are created in a [`BlockRuntime`], which bundles one instance of
//! each service. Nothing is process-global.
//!
//! # Examples
//!
//! ```
//! use futures::TryStreamExt;
//! use rblob::{Block, BlockRuntime, RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rblob::Result<()> {
//! let runtime = BlockRuntime::new(RuntimeConfig::default());
//!
//! let block = Block::new(&runtime, vec!["hello ".into(), "world".into()], "text/plain")?;
//! let word = block.slice(6, None, None);
//! assert_eq!(word.text().await?, "world");
//!
//! let pieces: Vec<_> = block.stream(4).try_collect().await?;
//! assert_eq!(pieces.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod constants;
pub mod content;
pub mod lifecycle;
pub mod memory;

mod block;
mod config;
mod runtime;
mod view;

pub use block::{Block, BlockError, BlockId, BlockPart, DisposableBlock, Result};
pub use cache::{CachePriority, EvictionCache};
pub use config::RuntimeConfig;
pub use content::{ContentStore, DeduplicationReport, HashStrategy};
pub use lifecycle::{CleanupReport, MemoryReport};
pub use memory::{PressureLevel, PressureSubscription, PressureThresholds};
pub use runtime::{BlockRuntime, MonitorHandle};
pub use view::ByteView;
