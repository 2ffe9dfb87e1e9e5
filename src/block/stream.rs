use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};

use super::{Block, Result};
use crate::view::ChunkIndex;

struct Cursor {
    block: Block,
    chunk_size: usize,
    /// Next byte to yield, relative to the block.
    position: usize,
    /// Root chunks and the block's absolute offset, resolved on first poll.
    root: Option<(Arc<ChunkIndex>, usize)>,
    finished: bool,
}

/// Yields `block` in pieces of at most `chunk_size` bytes.
///
/// Pieces inside one chunk are zero-copy slices of it; a piece straddling a
/// chunk boundary is copied. Chunk lookups are binary searches on the
/// root's offset index, so only chunks overlapping the block are visited.
pub(super) fn chunk_stream(
    block: Block,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    let cursor = Cursor {
        block,
        chunk_size: chunk_size.max(1),
        position: 0,
        root: None,
        finished: false,
    };

    stream::unfold(cursor, |mut cursor| async move {
        if cursor.finished {
            return None;
        }

        let (index, base) = match &cursor.root {
            Some(root) => root.clone(),
            None => match cursor.block.root_index().await {
                Ok(root) => {
                    cursor.root = Some(root.clone());
                    root
                }
                Err(err) => {
                    cursor.finished = true;
                    return Some((Err(err), cursor));
                }
            },
        };

        let size = cursor.block.inner.size;
        if cursor.position >= size {
            return None;
        }

        let len = cursor.chunk_size.min(size - cursor.position);
        match index.read(base + cursor.position, len) {
            Ok(piece) => {
                cursor.position += len;
                cursor.block.touch();
                Some((Ok(piece), cursor))
            }
            Err(err) => {
                cursor.finished = true;
                Some((Err(err), cursor))
            }
        }
    })
}
