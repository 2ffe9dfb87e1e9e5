use std::io;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Mutex;

use super::{chunking, BlockError, BlockInner, Result};
use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::view::ChunkIndex;

/// Source of a deferred root block.
pub(super) type ByteSource = BoxStream<'static, io::Result<Bytes>>;

enum LoadState {
    /// Still reading. Buffers received so far survive a cancelled load.
    Pending {
        source: ByteSource,
        received: Vec<Bytes>,
        received_len: usize,
    },
    /// The source failed or produced the wrong size. Sticky.
    Failed(BlockError),
    Done,
}

/// Bytes of a root block that are read from an async source on first use.
pub(super) struct DeferredRoot {
    declared_size: usize,
    loaded: OnceLock<Arc<ChunkIndex>>,
    state: Mutex<LoadState>,
}

impl DeferredRoot {
    pub(super) fn new(declared_size: usize, source: ByteSource) -> Self {
        Self {
            declared_size,
            loaded: OnceLock::new(),
            state: Mutex::new(LoadState::Pending {
                source,
                received: Vec::new(),
                received_len: 0,
            }),
        }
    }

    pub(super) fn loaded(&self) -> Option<&Arc<ChunkIndex>> {
        self.loaded.get()
    }

    /// Reads the whole source, checks its size and stores the result.
    ///
    /// Concurrent callers wait for a single load. On a size mismatch the
    /// received bytes are discarded and every later call fails the same way.
    pub(super) async fn load(&self, owner: &BlockInner) -> Result<Arc<ChunkIndex>> {
        if let Some(index) = self.loaded.get() {
            return Ok(index.clone());
        }

        let mut state = self.state.lock().await;
        if let Some(index) = self.loaded.get() {
            return Ok(index.clone());
        }

        let outcome = match &mut *state {
            LoadState::Failed(err) => return Err(err.clone()),
            LoadState::Done => return Err(BlockError::IntegrityFault { offset: 0 }),
            LoadState::Pending {
                source,
                received,
                received_len,
            } => drain(source, received, received_len, self.declared_size)
                .await
                .map(|()| std::mem::take(received)),
        };

        let buffers = match outcome {
            Ok(buffers) => buffers,
            Err(err) => {
                tracing::warn!("Deferred block {} failed to load: {}", owner.id, err);
                *state = LoadState::Failed(err.clone());
                return Err(err);
            }
        };
        *state = LoadState::Done;

        let index = Arc::new(ChunkIndex::new(self.commit(owner, buffers)));
        let index = self.loaded.get_or_init(|| index).clone();
        tracing::debug!(
            "Loaded deferred block {} ({} bytes, {} chunks)",
            owner.id,
            index.len(),
            index.chunk_count()
        );
        Ok(index)
    }

    /// Deduplicates the received buffers and charges them to the block.
    fn commit(&self, owner: &BlockInner, buffers: Vec<Bytes>) -> Vec<Bytes> {
        let Some(shared) = owner.runtime.upgrade() else {
            return chunking::into_chunks(buffers, DEFAULT_CHUNK_SIZE);
        };

        let mut keys = Vec::with_capacity(buffers.len());
        let mut stored = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            let content = shared.store.store(buffer);
            keys.extend(content.key);
            stored.push(content.data);
        }

        if shared
            .tracker
            .attach_data(owner.id, keys.clone(), self.declared_size)
        {
            shared.refresh_pressure();
        } else {
            // Disposed while loading.
            for key in &keys {
                shared.store.release(key);
            }
        }
        chunking::into_chunks(stored, shared.max_chunk_size)
    }
}

async fn drain(
    source: &mut ByteSource,
    received: &mut Vec<Bytes>,
    received_len: &mut usize,
    declared: usize,
) -> Result<()> {
    while let Some(item) = source.next().await {
        let buffer = item.map_err(|e| BlockError::Source(e.to_string()))?;
        *received_len += buffer.len();
        if *received_len > declared {
            return Err(BlockError::SizeMismatch {
                declared,
                actual: *received_len,
            });
        }
        if !buffer.is_empty() {
            received.push(buffer);
        }
    }

    if *received_len != declared {
        return Err(BlockError::SizeMismatch {
            declared,
            actual: *received_len,
        });
    }
    Ok(())
}
