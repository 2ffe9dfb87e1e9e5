use bytes::{Bytes, BytesMut};

use super::{BlockError, BlockPart, Result};

/// Turns construction parts into non-empty byte buffers.
pub(super) fn normalize(parts: Vec<BlockPart>) -> Result<Vec<Bytes>> {
    let mut buffers = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            BlockPart::Bytes(bytes) => buffers.push(bytes),
            BlockPart::Text(text) => buffers.push(Bytes::from(text)),
            BlockPart::Block(block) => {
                let (index, offset) = block.loaded_index().ok_or_else(|| {
                    BlockError::InvalidArgument(format!(
                        "block {} has a deferred source that has not been read",
                        block.id()
                    ))
                })?;
                buffers.extend(index.segments(offset, block.inner.size)?);
            }
        }
    }
    buffers.retain(|buffer| !buffer.is_empty());
    Ok(buffers)
}

/// Groups buffers into chunks of at most `max_chunk_size` bytes.
///
/// Buffers at least one chunk long, and a trailing buffer, are split without
/// copying. Shorter buffers are packed together into fresh chunks.
pub(super) fn into_chunks(buffers: Vec<Bytes>, max_chunk_size: usize) -> Vec<Bytes> {
    let max = max_chunk_size.max(1);
    let count = buffers.len();
    let mut chunks = Vec::new();
    let mut pending = BytesMut::new();

    for (i, mut buffer) in buffers.into_iter().enumerate() {
        let last = i + 1 == count;
        while !buffer.is_empty() {
            if pending.is_empty() && (buffer.len() >= max || last) {
                let take = buffer.len().min(max);
                chunks.push(buffer.split_to(take));
                continue;
            }
            let take = (max - pending.len()).min(buffer.len());
            pending.extend_from_slice(&buffer.split_to(take));
            if pending.len() == max {
                chunks.push(pending.split().freeze());
            }
        }
    }
    if !pending.is_empty() {
        chunks.push(pending.freeze());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lens(chunks: &[Bytes]) -> Vec<usize> {
        chunks.iter().map(|c| c.len()).collect()
    }

    #[test]
    fn test_single_part_is_kept_by_reference() {
        let part = Bytes::from(vec![7u8; 100]);
        let chunks = into_chunks(vec![part.clone()], 128);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ptr(), part.as_ptr());
    }

    #[test]
    fn test_oversized_part_is_split_without_copying() {
        let part = Bytes::from(vec![1u8; 300]);
        let chunks = into_chunks(vec![part.clone()], 128);
        assert_eq!(lens(&chunks), vec![128, 128, 44]);
        assert_eq!(chunks[1].as_ptr(), part[128..].as_ptr());
    }

    #[test]
    fn test_small_parts_are_packed() {
        let parts = vec![
            Bytes::from(vec![1u8; 50]),
            Bytes::from(vec![2u8; 50]),
            Bytes::from(vec![3u8; 50]),
        ];
        let chunks = into_chunks(parts, 128);
        assert_eq!(lens(&chunks), vec![128, 22]);
        assert_eq!(chunks[0][49], 1);
        assert_eq!(chunks[0][50], 2);
        assert_eq!(chunks[0][127], 3);
    }

    #[test]
    fn test_no_chunk_exceeds_limit() {
        let parts: Vec<Bytes> = [5usize, 200, 3, 64, 129, 1]
            .iter()
            .map(|&n| Bytes::from(vec![0u8; n]))
            .collect();
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let chunks = into_chunks(parts, 64);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 64));
        assert_eq!(lens(&chunks).iter().sum::<usize>(), total);
    }

    #[test]
    fn test_normalize_drops_empty_parts() {
        let buffers = normalize(vec![
            BlockPart::from(""),
            BlockPart::from("héllo"),
            BlockPart::from(Vec::<u8>::new()),
        ])
        .unwrap();
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].as_ref(), "héllo".as_bytes());
    }
}
