use bytes::Bytes;

use super::Block;

/// One input to [`Block::new`].
#[derive(Debug, Clone)]
pub enum BlockPart {
    /// Raw bytes, kept by reference.
    Bytes(Bytes),
    /// Text, stored as UTF-8.
    Text(String),
    /// Another block, contributing its bytes without copying.
    Block(Block),
}

impl From<Bytes> for BlockPart {
    fn from(bytes: Bytes) -> Self {
        BlockPart::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BlockPart {
    fn from(bytes: Vec<u8>) -> Self {
        BlockPart::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for BlockPart {
    fn from(bytes: &[u8]) -> Self {
        BlockPart::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for BlockPart {
    fn from(text: String) -> Self {
        BlockPart::Text(text)
    }
}

impl From<&str> for BlockPart {
    fn from(text: &str) -> Self {
        BlockPart::Text(text.to_owned())
    }
}

impl From<Block> for BlockPart {
    fn from(block: Block) -> Self {
        BlockPart::Block(block)
    }
}

impl From<&Block> for BlockPart {
    fn from(block: &Block) -> Self {
        BlockPart::Block(block.clone())
    }
}
