//! # Tessera Blockstore
//!
//! Content-addressed block storage for the Tessera collection engine.
//!
//! The collection engine never cares where chunks live. It only needs:
//! - **put**: store bytes, receive their content address
//! - **get**: fetch the bytes behind an address (missing is an error, never empty)
//! - **has**: cheap existence check
//!
//! Any backend implementing [`BlockStore`] can host collections. This crate ships
//! [`MemoryBlockStore`] for tests, tools, and caching layers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Collections (tessera-core)       │
//! ├─────────────────────────────────────────┤
//! │           BlockStore Trait              │
//! ├─────────────────────────────────────────┤
//! │   MemoryBlockStore  │  external backends│
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_blockstore::{BlockStore, MemoryBlockStore};
//!
//! let store = MemoryBlockStore::new();
//! let cid = store.put_block(b"chunk bytes").await?;
//! let bytes = store.get_block(&cid).await?;
//! ```

pub mod cid_utils;
pub mod error;
pub mod memory;

pub use cid_utils::{cid_from_digest, create_cid, digest_of, CidCodec};
pub use error::{BlockStoreError, Result};
pub use memory::MemoryBlockStore;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;

/// Maximum block size accepted by the bundled backends (16 MB)
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Trait for block storage backends
///
/// Addresses are CIDv1 with a BLAKE3-256 multihash, so the digest inside a CID is
/// exactly the BLAKE3 hash of the stored bytes. Repeated puts of identical bytes
/// are idempotent and return the same CID.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block and return its CID
    async fn put_block(&self, data: &[u8]) -> Result<Cid>;

    /// Retrieve a block by CID
    ///
    /// Returns [`BlockStoreError::NotFound`] when the block is absent.
    async fn get_block(&self, cid: &Cid) -> Result<Bytes>;

    /// Check if a block exists
    async fn has_block(&self, cid: &Cid) -> Result<bool>;

    /// Delete a block
    async fn delete_block(&self, cid: &Cid) -> Result<()>;
}

/// Backends that can enumerate their contents
///
/// Required for reachability-based garbage collection.
#[async_trait]
pub trait BlockListing: BlockStore {
    /// List every CID currently stored
    async fn list_blocks(&self) -> Result<Vec<Cid>>;
}
