//! Zero-copy read windows over chunked byte storage.
//!
//! A [`ByteView`] is either a root view over a list of chunks or a sub-view
//! `(parent, offset, len)` over another view. Sub-views keep their parent
//! alive and delegate reads to it; unlike block slices they are not
//! flattened, since view chains are shallow and short-lived.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use rblob::ByteView;
//!
//! let view = ByteView::from_chunks([Bytes::from_static(b"hello "), Bytes::from_static(b"world")]);
//! assert_eq!(view.len(), 11);
//! assert_eq!(view.byte_at(6).unwrap(), b'w');
//!
//! let sub = view.subview(4, 4).unwrap();
//! assert_eq!(sub.materialize().unwrap().as_ref(), b"o wo");
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::block::{BlockError, Result};

/// Chunks of a root block together with the start offset of each chunk.
pub(crate) struct ChunkIndex {
    chunks: Vec<Bytes>,
    starts: Vec<usize>,
    len: usize,
}

impl ChunkIndex {
    pub(crate) fn new(chunks: Vec<Bytes>) -> Self {
        let chunks: Vec<Bytes> = chunks.into_iter().filter(|c| !c.is_empty()).collect();
        let mut starts = Vec::with_capacity(chunks.len());
        let mut len = 0;
        for chunk in &chunks {
            starts.push(len);
            len += chunk.len();
        }
        Self {
            chunks,
            starts,
            len,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the chunk holding `offset` and the position inside that chunk.
    pub(crate) fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        if offset >= self.len {
            return None;
        }
        let idx = self
            .starts
            .partition_point(|&start| start <= offset)
            .checked_sub(1)?;
        Some((idx, offset - self.starts[idx]))
    }

    /// Zero-copy pieces covering `start..start + len`, one per overlapping chunk.
    pub(crate) fn segments(&self, start: usize, len: usize) -> Result<Vec<Bytes>> {
        let end = start + len;
        let mut pieces = Vec::new();
        let mut pos = start;
        while pos < end {
            let (idx, within) = self
                .locate(pos)
                .ok_or(BlockError::IntegrityFault { offset: pos })?;
            let chunk = &self.chunks[idx];
            let take = (chunk.len() - within).min(end - pos);
            pieces.push(chunk.slice(within..within + take));
            pos += take;
        }
        Ok(pieces)
    }

    /// Returns `start..start + len` without copying if it sits inside one chunk.
    pub(crate) fn contiguous(&self, start: usize, len: usize) -> Option<Bytes> {
        if len == 0 {
            return Some(Bytes::new());
        }
        let (idx, within) = self.locate(start)?;
        let chunk = &self.chunks[idx];
        (within + len <= chunk.len()).then(|| chunk.slice(within..within + len))
    }

    /// Returns the only chunk when `start..start + len` covers it exactly.
    pub(crate) fn whole_chunk(&self, start: usize, len: usize) -> Option<&Bytes> {
        match self.chunks.as_slice() {
            [only] if start == 0 && len == only.len() => Some(only),
            _ => None,
        }
    }

    /// Copies bytes starting at `start` into `dst`, walking chunk boundaries.
    pub(crate) fn copy_range(&self, start: usize, dst: &mut [u8]) -> Result<()> {
        let mut pos = start;
        let mut written = 0;
        while written < dst.len() {
            let (idx, within) = self
                .locate(pos)
                .ok_or(BlockError::IntegrityFault { offset: pos })?;
            let chunk = &self.chunks[idx];
            let take = (chunk.len() - within).min(dst.len() - written);
            dst[written..written + take].copy_from_slice(&chunk[within..within + take]);
            written += take;
            pos += take;
        }
        Ok(())
    }

    /// Produces `start..start + len` as one buffer, copying only if the range
    /// spans more than one chunk.
    pub(crate) fn read(&self, start: usize, len: usize) -> Result<Bytes> {
        if let Some(bytes) = self.contiguous(start, len) {
            return Ok(bytes);
        }
        let mut buf = BytesMut::zeroed(len);
        self.copy_range(start, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// A read-only window over one or more byte chunks.
///
/// Cloning a view is cheap: root views share their chunk index and sub-views
/// share their parent.
#[derive(Clone)]
pub struct ByteView {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Root(Arc<ChunkIndex>),
    Sub {
        parent: Arc<ByteView>,
        offset: usize,
        len: usize,
    },
}

impl ByteView {
    /// Creates a root view over the given chunks. Empty chunks are skipped.
    pub fn from_chunks(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        Self::root(Arc::new(ChunkIndex::new(chunks.into_iter().collect())))
    }

    pub(crate) fn root(index: Arc<ChunkIndex>) -> Self {
        Self {
            repr: Repr::Root(index),
        }
    }

    /// Returns the number of bytes visible through this view.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Root(index) => index.len(),
            Repr::Sub { len, .. } => *len,
        }
    }

    /// Returns true if the view covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a view over `offset..offset + len` of this view.
    ///
    /// Unlike [`Block::slice`](crate::Block::slice), out-of-range requests are
    /// rejected rather than clamped.
    pub fn subview(&self, offset: usize, len: usize) -> Result<ByteView> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(Self {
                repr: Repr::Sub {
                    parent: Arc::new(self.clone()),
                    offset,
                    len,
                },
            }),
            _ => Err(BlockError::Range {
                index: offset.saturating_add(len),
                len: size,
            }),
        }
    }

    /// Returns the byte at `index`.
    pub fn byte_at(&self, index: usize) -> Result<u8> {
        let len = self.len();
        if index >= len {
            return Err(BlockError::Range { index, len });
        }
        match &self.repr {
            Repr::Root(chunks) => chunks
                .locate(index)
                .map(|(idx, within)| chunks.chunks[idx][within])
                .ok_or(BlockError::IntegrityFault { offset: index }),
            Repr::Sub { parent, offset, .. } => parent.byte_at(offset + index),
        }
    }

    /// Copies the whole view into `target` starting at `offset`.
    ///
    /// Returns the number of bytes written.
    pub fn copy_into(&self, target: &mut [u8], offset: usize) -> Result<usize> {
        let len = self.len();
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= target.len())
            .ok_or(BlockError::Range {
                index: offset.saturating_add(len),
                len: target.len(),
            })?;
        self.read_into(0, &mut target[offset..end])?;
        Ok(len)
    }

    fn read_into(&self, start: usize, dst: &mut [u8]) -> Result<()> {
        match &self.repr {
            Repr::Root(index) => index.copy_range(start, dst),
            Repr::Sub { parent, offset, .. } => parent.read_into(offset + start, dst),
        }
    }

    /// Walks to the root chunk index, returning it with this view's absolute offset.
    fn resolve(&self) -> (&ChunkIndex, usize) {
        match &self.repr {
            Repr::Root(index) => (&**index, 0),
            Repr::Sub { parent, offset, .. } => {
                let (index, base) = parent.resolve();
                (index, base + offset)
            }
        }
    }

    /// Copies the visible bytes into a single buffer.
    ///
    /// Views that fall inside one chunk are returned without copying.
    pub fn materialize(&self) -> Result<Bytes> {
        let (index, base) = self.resolve();
        index.read(base, self.len())
    }

    /// Returns the visible bytes without copying if they sit inside one chunk.
    pub fn contiguous(&self) -> Option<Bytes> {
        let (index, base) = self.resolve();
        index.contiguous(base, self.len())
    }

    /// Returns true if the view maps to exactly one whole chunk.
    pub fn is_single_chunk(&self) -> bool {
        let (index, base) = self.resolve();
        index.whole_chunk(base, self.len()).is_some()
    }

    /// Returns the underlying chunk if the view maps to exactly one whole
    /// chunk with no offset. This is the only zero-copy exit that hands out
    /// a stored chunk unchanged.
    pub fn direct_reference(&self) -> Option<Bytes> {
        let (index, base) = self.resolve();
        index.whole_chunk(base, self.len()).cloned()
    }

    /// Returns zero-copy pieces of the visible bytes, one per overlapping chunk.
    pub fn segments(&self) -> Result<Vec<Bytes>> {
        let (index, base) = self.resolve();
        index.segments(base, self.len())
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, base) = self.resolve();
        f.debug_struct("ByteView")
            .field("offset", &base)
            .field("len", &self.len())
            .field("chunks", &index.chunk_count())
            .finish()
    }
}
