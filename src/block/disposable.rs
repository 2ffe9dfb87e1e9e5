use bytes::Bytes;
use futures::Stream;
use parking_lot::RwLock;

use super::{Block, BlockError, BlockId, Result};
use crate::view::ByteView;

/// A block whose storage can be released before its handles are dropped.
///
/// [`dispose`](Self::dispose) releases the block's content references and
/// memory accounting at once and detaches the drop hook, so storage is
/// released exactly once however the block later goes away. Every accessor
/// fails with [`BlockError::Disposed`] afterwards.
pub struct DisposableBlock {
    block: RwLock<Option<Block>>,
}

impl DisposableBlock {
    pub fn new(block: Block) -> Self {
        Self {
            block: RwLock::new(Some(block)),
        }
    }

    /// Releases the block. Returns false if it was already disposed.
    pub fn dispose(&self) -> bool {
        let Some(block) = self.block.write().take() else {
            return false;
        };
        if let Some(info) = block.release_storage() {
            tracing::debug!(
                "Disposed block {} ({} bytes released)",
                info.block_id,
                info.memory_cost
            );
        }
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.block.read().is_none()
    }

    fn live(&self) -> Result<Block> {
        self.block.read().clone().ok_or(BlockError::Disposed)
    }

    pub fn id(&self) -> Result<BlockId> {
        Ok(self.live()?.id())
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.live()?.size())
    }

    pub fn content_type(&self) -> Result<String> {
        Ok(self.live()?.content_type().to_owned())
    }

    /// See [`Block::slice`].
    pub fn slice(
        &self,
        start: isize,
        end: Option<isize>,
        content_type: Option<&str>,
    ) -> Result<Block> {
        Ok(self.live()?.slice(start, end, content_type))
    }

    pub fn direct_data(&self) -> Result<Option<Bytes>> {
        Ok(self.live()?.direct_data())
    }

    pub async fn bytes(&self) -> Result<Bytes> {
        let block = self.live()?;
        block.bytes().await
    }

    pub async fn text(&self) -> Result<String> {
        let block = self.live()?;
        block.text().await
    }

    pub fn stream(
        &self,
        chunk_size: usize,
    ) -> Result<impl Stream<Item = Result<Bytes>> + Send + 'static> {
        Ok(self.live()?.stream(chunk_size))
    }

    pub async fn byte_view(&self) -> Result<ByteView> {
        let block = self.live()?;
        block.byte_view().await
    }
}

impl From<Block> for DisposableBlock {
    fn from(block: Block) -> Self {
        Self::new(block)
    }
}
