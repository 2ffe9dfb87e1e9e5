//! Immutable, sliceable byte blocks.
//!
//! A [`Block`] is either a *root*, owning a list of chunks, or a *slice*
//! `(root, offset, len)` over a root. Slicing a slice walks to the root and
//! adds the offsets, so a slice never points at another slice and reads are
//! always one hop away from the chunk data.
//!
//! Construction normalizes every [`BlockPart`] to bytes, passes each buffer
//! through the runtime's [`ContentStore`](crate::content::ContentStore) so
//! identical payloads share storage, and packs the results into chunks of at
//! most [`RuntimeConfig::max_chunk_size`](crate::RuntimeConfig) bytes.
//!
//! Every block registers with the runtime's
//! [`LifecycleTracker`](crate::lifecycle::LifecycleTracker) and unregisters
//! when its last handle is dropped.
//!
//! # Examples
//!
//! ```
//! use rblob::{Block, BlockRuntime, RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rblob::Result<()> {
//! let runtime = BlockRuntime::new(RuntimeConfig::default());
//! let block = Block::new(&runtime, vec![vec![1u8, 2, 3, 4, 5].into()], "")?;
//!
//! let tail = block.slice(-3, Some(-1), None);
//! assert_eq!(tail.bytes().await?.as_ref(), &[3, 4]);
//! # Ok(())
//! # }
//! ```

mod chunking;
mod deferred;
mod disposable;
mod error;
mod part;
mod stream;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::cache::CachePriority;
use crate::content::ContentKey;
use crate::lifecycle::{LivenessHandle, TrackingInfo};
use crate::runtime::{BlockRuntime, RuntimeShared};
use crate::view::{ByteView, ChunkIndex};

use self::deferred::DeferredRoot;

pub use disposable::DisposableBlock;
pub use error::{BlockError, Result};
pub use part::BlockPart;

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u64);

impl BlockId {
    #[cfg(test)]
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    fn next() -> Self {
        Self(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable byte container.
///
/// Cloning a `Block` is cheap and yields another handle to the same block;
/// the block is finalized when the last handle (including slices of it and
/// cache entries) is dropped.
#[derive(Clone)]
pub struct Block {
    inner: Arc<BlockInner>,
}

struct BlockInner {
    id: BlockId,
    content_type: String,
    size: usize,
    storage: Storage,
    /// Copy made by the first `bytes()` call that could not borrow a chunk.
    materialized: OnceLock<Bytes>,
    runtime: Weak<RuntimeShared>,
    /// Set once explicit disposal has released the block's storage.
    detached: AtomicBool,
}

enum Storage {
    Root(RootData),
    /// `root` is always a root block.
    Slice { root: Block, offset: usize },
}

enum RootData {
    Chunks(Arc<ChunkIndex>),
    Deferred(DeferredRoot),
}

/// Resolves a possibly negative index against `size`, clamping to `0..=size`.
fn resolve_index(index: isize, size: usize) -> usize {
    if index < 0 {
        size.saturating_sub(index.unsigned_abs())
    } else {
        index.unsigned_abs().min(size)
    }
}

impl Block {
    /// Builds a root block from `parts`.
    ///
    /// Nested blocks contribute their bytes without copying. A nested block
    /// whose deferred source has not been loaded yet is rejected with
    /// [`BlockError::InvalidArgument`].
    pub fn new(
        runtime: &BlockRuntime,
        parts: Vec<BlockPart>,
        content_type: impl Into<String>,
    ) -> Result<Block> {
        let shared = runtime.shared();
        let buffers = chunking::normalize(parts)?;

        let mut data_ids = Vec::with_capacity(buffers.len());
        let mut stored = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            let content = shared.store.store(buffer);
            data_ids.extend(content.key);
            stored.push(content.data);
        }

        let index = Arc::new(ChunkIndex::new(chunking::into_chunks(
            stored,
            shared.max_chunk_size,
        )));
        let size = index.len();
        Ok(Self::assemble(
            Arc::downgrade(shared),
            size,
            Storage::Root(RootData::Chunks(index)),
            content_type.into(),
            data_ids,
            size,
        ))
    }

    /// Builds a root block whose bytes come from `source`.
    ///
    /// The source is read in full on the first access that needs bytes. If
    /// it yields more or fewer than `declared_size` bytes, that access and
    /// every later one fails with [`BlockError::SizeMismatch`].
    pub fn from_stream<S>(
        runtime: &BlockRuntime,
        declared_size: usize,
        source: S,
        content_type: impl Into<String>,
    ) -> Block
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        let deferred = DeferredRoot::new(declared_size, source.boxed());
        Self::assemble(
            Arc::downgrade(runtime.shared()),
            declared_size,
            Storage::Root(RootData::Deferred(deferred)),
            content_type.into(),
            Vec::new(),
            0,
        )
    }

    fn assemble(
        runtime: Weak<RuntimeShared>,
        size: usize,
        storage: Storage,
        content_type: String,
        data_ids: Vec<ContentKey>,
        memory_cost: usize,
    ) -> Block {
        let id = BlockId::next();
        let inner = Arc::new(BlockInner {
            id,
            content_type,
            size,
            storage,
            materialized: OnceLock::new(),
            runtime,
            detached: AtomicBool::new(false),
        });

        if let Some(shared) = inner.runtime.upgrade() {
            let weak: Weak<BlockInner> = Arc::downgrade(&inner);
            let handle: LivenessHandle = weak;
            shared.register_block(id, handle, data_ids, memory_cost);
        } else {
            tracing::warn!("Block {} created after its runtime was dropped", id);
        }
        Block { inner }
    }

    pub fn id(&self) -> BlockId {
        self.inner.id
    }

    /// Returns the id of the root block holding this block's bytes.
    pub fn root_id(&self) -> BlockId {
        self.root_and_offset().0.id
    }

    pub fn is_slice(&self) -> bool {
        matches!(self.inner.storage, Storage::Slice { .. })
    }

    /// Returns the size in bytes.
    pub fn size(&self) -> usize {
        self.touch();
        self.inner.size
    }

    pub fn content_type(&self) -> &str {
        &self.inner.content_type
    }

    /// Returns the estimated memory attributed to this block.
    pub fn memory_cost(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .and_then(|shared| shared.tracker.tracking_info(self.inner.id))
            .map_or(0, |info| info.memory_cost)
    }

    /// Returns a block over `start..end` of this one.
    ///
    /// Negative indices count back from the end. Both bounds are clamped to
    /// `0..=size`, and `start >= end` yields an empty block. `end` defaults
    /// to the size and `content_type` to this block's type. No bytes are
    /// copied.
    pub fn slice(&self, start: isize, end: Option<isize>, content_type: Option<&str>) -> Block {
        self.touch();
        let size = self.inner.size;
        let start = resolve_index(start, size);
        let end = end.map_or(size, |end| resolve_index(end, size));
        let len = end.saturating_sub(start);

        let (root, offset) = match &self.inner.storage {
            Storage::Slice { root, offset } => (root.clone(), offset + start),
            Storage::Root(_) => (self.clone(), start),
        };
        let content_type = content_type.map_or_else(|| self.inner.content_type.clone(), str::to_owned);

        Self::assemble(
            self.inner.runtime.clone(),
            len,
            Storage::Slice { root, offset },
            content_type,
            Vec::new(),
            0,
        )
    }

    /// Returns the single underlying chunk if this block covers exactly one
    /// whole chunk, without copying.
    ///
    /// Returns `None` otherwise, and for deferred blocks not loaded yet;
    /// use [`bytes`](Self::bytes) then.
    pub fn direct_data(&self) -> Option<Bytes> {
        self.touch();
        let (index, offset) = self.loaded_index()?;
        index.whole_chunk(offset, self.inner.size).cloned()
    }

    /// Returns the full contents as one buffer.
    ///
    /// Blocks that fit inside one chunk are returned without copying. Other
    /// blocks are copied once and the copy is kept for later calls.
    pub async fn bytes(&self) -> Result<Bytes> {
        self.touch();
        if let Some(bytes) = self.inner.materialized.get() {
            return Ok(bytes.clone());
        }

        let (index, offset) = self.root_index().await?;
        if let Some(bytes) = index.contiguous(offset, self.inner.size) {
            return Ok(bytes);
        }

        let bytes = index.read(offset, self.inner.size)?;
        if self.inner.materialized.set(bytes.clone()).is_ok() {
            if let Some(shared) = self.inner.runtime.upgrade() {
                shared.tracker.add_memory_cost(self.inner.id, bytes.len());
            }
        }
        Ok(self.inner.materialized.get().cloned().unwrap_or(bytes))
    }

    /// Returns the contents decoded as UTF-8, replacing malformed sequences
    /// with U+FFFD.
    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns a stream of buffers of at most `chunk_size` bytes whose
    /// concatenation is the block's contents.
    ///
    /// Each call starts a new pass from the beginning. Dropping the stream
    /// early is fine. [`DEFAULT_STREAM_CHUNK_SIZE`](crate::constants::DEFAULT_STREAM_CHUNK_SIZE)
    /// is a reasonable `chunk_size`; zero is treated as one.
    pub fn stream(&self, chunk_size: usize) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        self.touch();
        stream::chunk_stream(self.clone(), chunk_size)
    }

    /// Returns a view over this block's bytes.
    pub async fn byte_view(&self) -> Result<ByteView> {
        self.touch();
        let (index, offset) = self.root_index().await?;
        let view = ByteView::root(index);
        if offset == 0 && view.len() == self.inner.size {
            Ok(view)
        } else {
            view.subview(offset, self.inner.size)
        }
    }

    /// Memoizes this block in the runtime's cache under `key`.
    ///
    /// Returns false if the block is larger than the whole cache or the
    /// runtime is gone.
    pub fn cache(&self, key: impl Into<String>, priority: CachePriority) -> bool {
        match self.inner.runtime.upgrade() {
            Some(shared) => shared
                .cache
                .put(key.into(), self.clone(), self.inner.size, priority),
            None => false,
        }
    }

    /// Releases the block's storage now instead of on drop.
    ///
    /// Returns the tracking info on the first call, `None` afterwards.
    fn release_storage(&self) -> Option<TrackingInfo> {
        if self.inner.detached.swap(true, Ordering::AcqRel) {
            return None;
        }
        let shared = self.inner.runtime.upgrade()?;
        shared.tracker.finalize(self.inner.id)
    }

    fn touch(&self) {
        if let Some(shared) = self.inner.runtime.upgrade() {
            shared.tracker.touch(self.inner.id);
            if let Storage::Slice { root, .. } = &self.inner.storage {
                shared.tracker.touch(root.inner.id);
            }
        }
    }

    fn root_and_offset(&self) -> (&BlockInner, usize) {
        match &self.inner.storage {
            Storage::Slice { root, offset } => (&*root.inner, *offset),
            Storage::Root(_) => (&*self.inner, 0),
        }
    }

    /// Returns the root chunk index and this block's offset into it, if the
    /// root's bytes are available without loading.
    fn loaded_index(&self) -> Option<(Arc<ChunkIndex>, usize)> {
        let (root, offset) = self.root_and_offset();
        match &root.storage {
            Storage::Root(RootData::Chunks(index)) => Some((index.clone(), offset)),
            Storage::Root(RootData::Deferred(deferred)) => {
                deferred.loaded().map(|index| (index.clone(), offset))
            }
            Storage::Slice { .. } => None,
        }
    }

    /// Returns the root chunk index and this block's offset into it, loading
    /// a deferred root first.
    async fn root_index(&self) -> Result<(Arc<ChunkIndex>, usize)> {
        let (root, offset) = self.root_and_offset();
        match &root.storage {
            Storage::Root(RootData::Chunks(index)) => Ok((index.clone(), offset)),
            Storage::Root(RootData::Deferred(deferred)) => {
                Ok((deferred.load(root).await?, offset))
            }
            Storage::Slice { .. } => Err(BlockError::IntegrityFault { offset }),
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Block");
        s.field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("content_type", &self.inner.content_type);
        if let Storage::Slice { root, offset } = &self.inner.storage {
            s.field("root", &root.inner.id).field("offset", offset);
        }
        s.finish()
    }
}

impl Drop for BlockInner {
    fn drop(&mut self) {
        if self.detached.load(Ordering::Acquire) {
            return;
        }
        if let Some(shared) = self.runtime.upgrade() {
            shared.tracker.finalize(self.id);
        }
    }
}
