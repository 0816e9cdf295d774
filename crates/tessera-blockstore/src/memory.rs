//! In-memory block store for tests, tools, and caching

use crate::cid_utils::{create_cid, CidCodec};
use crate::{BlockListing, BlockStore, BlockStoreError, Result, MAX_BLOCK_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// An in-memory block store
///
/// Clones share the same underlying map, so a store can be handed to several
/// collections and inspected afterwards.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<DashMap<Cid, Bytes>>,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl MemoryBlockStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of blocks stored
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Clear all blocks
    pub fn clear(&self) {
        self.blocks.clear();
    }

    /// Get total size of all blocks
    pub fn total_size(&self) -> u64 {
        self.blocks.iter().map(|entry| entry.value().len() as u64).sum()
    }

    /// List all CIDs
    pub fn list_cids(&self) -> Vec<Cid> {
        self.blocks.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of successful `get_block` calls served so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `put_block` calls served so far, including repeats
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put_block(&self, data: &[u8]) -> Result<Cid> {
        if data.len() > MAX_BLOCK_SIZE {
            return Err(BlockStoreError::BlockTooLarge {
                size: data.len(),
                max: MAX_BLOCK_SIZE,
            });
        }

        let cid = create_cid(data, CidCodec::Raw);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.blocks
            .entry(cid)
            .or_insert_with(|| Bytes::copy_from_slice(data));
        trace!(%cid, size = data.len(), "stored block");
        Ok(cid)
    }

    async fn get_block(&self, cid: &Cid) -> Result<Bytes> {
        let data = self
            .blocks
            .get(cid)
            .map(|entry| entry.value().clone())
            .ok_or(BlockStoreError::NotFound(*cid))?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    async fn has_block(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.contains_key(cid))
    }

    async fn delete_block(&self, cid: &Cid) -> Result<()> {
        self.blocks.remove(cid);
        Ok(())
    }
}

#[async_trait]
impl BlockListing for MemoryBlockStore {
    async fn list_blocks(&self) -> Result<Vec<Cid>> {
        Ok(self.list_cids())
    }
}
