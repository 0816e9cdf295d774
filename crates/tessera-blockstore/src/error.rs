//! Error types for the tessera-blockstore crate

use cid::Cid;
use thiserror::Error;

/// Result type alias using `BlockStoreError`
pub type Result<T> = std::result::Result<T, BlockStoreError>;

/// Errors that can occur during block storage operations
#[derive(Error, Debug)]
pub enum BlockStoreError {
    /// Block not found
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// Invalid CID
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// Block too large
    #[error("block too large: {size} bytes exceeds maximum {max} bytes")]
    BlockTooLarge { size: usize, max: usize },

    /// Hash mismatch
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Backend failure reported by an external store
    #[error("backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
