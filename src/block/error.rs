use thiserror::Error;

/// Errors that can occur when building or reading blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// A construction part could not be turned into bytes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A byte index fell outside the readable range.
    #[error("index {index} out of range for length {len}")]
    Range { index: usize, len: usize },

    /// The block was explicitly disposed.
    #[error("block has been disposed")]
    Disposed,

    /// A deferred source produced a different number of bytes than declared.
    #[error("size mismatch: declared {declared} bytes, source produced {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// No chunk owns a byte offset that should be in range.
    #[error("integrity fault: no chunk holds offset {offset}")]
    IntegrityFault { offset: usize },

    /// A deferred source failed while being read.
    #[error("source error: {0}")]
    Source(String),

    /// A background task was requested outside a Tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BlockError>;
