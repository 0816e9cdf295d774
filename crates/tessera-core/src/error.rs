//! Error types for the tessera-core crate

use crate::hash::Hash;
use crate::value::{SequenceKind, ValueType};
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in collection operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// A referenced chunk is missing from the block store
    #[error("chunk not found: {0}")]
    ChunkNotFound(Hash),

    /// An item does not conform to the collection's declared type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: ValueType, actual: ValueType },

    /// Dereferenced a cursor outside its sequence
    #[error("invalid cursor: index {index} in sequence of length {len}")]
    InvalidCursor { index: i64, len: usize },

    /// Index argument outside the collection
    #[error("index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    /// Range argument whose start lies past its end
    #[error("invalid range: {start}..{end}")]
    InvalidRange { start: u64, end: u64 },

    /// Loaded or compared a collection of the wrong kind
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: SequenceKind,
        actual: SequenceKind,
    },

    /// Fetched bytes do not hash to the requested address
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Hash, actual: Hash },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Tree corruption detected
    #[error("tree corruption: {0}")]
    TreeCorruption(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Block store error
    #[error("block store error: {0}")]
    BlockStore(#[from] tessera_blockstore::BlockStoreError),
}
