//! Content-addressable deduplication of byte buffers.
//!
//! Every buffer that enters a block passes through a [`ContentStore`]. When
//! an identical buffer is already stored, the existing allocation is handed
//! back and its reference count goes up, so blocks built from the same bytes
//! share memory.
//!
//! # Hashing
//!
//! Buffers under 1 KiB are hashed in full. Larger buffers are hashed from a
//! head, middle and tail sample plus their length, which keeps hashing cost
//! flat regardless of size. Because sampling makes collisions plausible, a
//! hash match is always confirmed by comparing the bytes; colliding but
//! different contents get separate entries under the same hash with a
//! distinct serial. Use [`HashStrategy::Full`] to hash every byte instead.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use rblob::content::{ContentStore, HashStrategy};
//!
//! let store = ContentStore::new(HashStrategy::default());
//! let first = store.store(Bytes::from(vec![1u8; 4096]));
//! let second = store.store(Bytes::from(vec![1u8; 4096]));
//!
//! assert_eq!(first.key, second.key);
//! assert_eq!(store.report().duplicate_block_count, 1);
//! assert_eq!(store.report().total_saved_memory, 4096);
//! ```

mod hash;
mod store;

pub use hash::{content_hash, ContentKey, HashStrategy};
pub use store::{ContentStore, DeduplicationReport, StoredContent};

#[cfg(test)]
mod tests;
