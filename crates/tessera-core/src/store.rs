//! Value store: chunk reads and writes over a block store
//!
//! Wraps any [`BlockStore`] with:
//! - decoding and hash verification of fetched chunks
//! - a bounded LRU cache of decoded sequences
//! - deferred, bounded-concurrency persistence of freshly built chunks
//! - reachability-based garbage collection for listable stores

use crate::config::ChunkConfig;
use crate::hash::Hash;
use crate::prolly::{codec, MetaTuple, Sequence};
use crate::walk;
use crate::{CoreError, Result};
use dashmap::DashSet;
use futures::stream::{self, StreamExt, TryStreamExt};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tessera_blockstore::{BlockListing, BlockStore, BlockStoreError};
use tracing::{debug, instrument, trace};

/// Chunk-level access to a block store
pub struct ValueStore<S: BlockStore> {
    blocks: Arc<S>,
    config: ChunkConfig,
    cache: Mutex<LruCache<Hash, Arc<Sequence>>>,
    written: DashSet<Hash>,
}

impl<S: BlockStore> ValueStore<S> {
    /// Create a store with the default configuration
    pub fn new(blocks: Arc<S>) -> Self {
        let config = ChunkConfig::default();
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self::build(blocks, config, capacity)
    }

    /// Create a store with a custom configuration
    pub fn with_config(blocks: Arc<S>, config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| CoreError::Configuration("cache_capacity must be positive".into()))?;
        Ok(Self::build(blocks, config, capacity))
    }

    fn build(blocks: Arc<S>, config: ChunkConfig, capacity: NonZeroUsize) -> Self {
        Self {
            blocks,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
            written: DashSet::new(),
        }
    }

    /// The underlying block store
    pub fn blocks(&self) -> &Arc<S> {
        &self.blocks
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Whether a chunk is known to be in the block store
    pub fn is_written(&self, hash: &Hash) -> bool {
        self.written.contains(hash)
    }

    /// Fetch and decode the chunk stored under `hash`
    ///
    /// A missing block is reported as [`CoreError::ChunkNotFound`].
    #[instrument(skip(self), level = "trace")]
    pub async fn read_sequence(&self, hash: Hash) -> Result<Arc<Sequence>> {
        if let Some(seq) = self.cache.lock().get(&hash) {
            trace!(%hash, "chunk cache hit");
            return Ok(Arc::clone(seq));
        }

        let bytes = self
            .blocks
            .get_block(&hash.to_cid())
            .await
            .map_err(|e| match e {
                BlockStoreError::NotFound(_) => CoreError::ChunkNotFound(hash),
                other => CoreError::BlockStore(other),
            })?;
        let seq = Arc::new(codec::decode(bytes, hash)?);

        self.written.insert(hash);
        self.cache.lock().put(hash, Arc::clone(&seq));
        Ok(seq)
    }

    /// The child a meta tuple points at, from memory or from the store
    pub async fn child_sequence(&self, tuple: &MetaTuple) -> Result<Arc<Sequence>> {
        match tuple.child.sequence() {
            Some(seq) => Ok(Arc::clone(seq)),
            None => self.read_sequence(tuple.hash()).await,
        }
    }

    /// Children of several tuples, fetched concurrently, in tuple order
    pub async fn read_children(&self, tuples: &[MetaTuple]) -> Result<Vec<Arc<Sequence>>> {
        stream::iter(tuples.iter().map(|t| self.child_sequence(t)))
            .buffered(self.config.read_concurrency)
            .try_collect()
            .await
    }

    async fn put_sequence(&self, seq: &Sequence) -> Result<()> {
        let cid = self.blocks.put_block(seq.encoded()).await?;
        let stored = Hash::from_cid(&cid);
        if stored != Some(seq.hash()) {
            return Err(CoreError::HashMismatch {
                expected: seq.hash(),
                actual: stored.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Write one chunk, without its children
    #[instrument(skip(self, seq), fields(hash = %seq.hash()), level = "trace")]
    pub async fn write_sequence(&self, seq: &Sequence) -> Result<Hash> {
        self.put_sequence(seq).await?;
        self.written.insert(seq.hash());
        Ok(seq.hash())
    }

    /// Write every not-yet-written chunk reachable from `root`
    ///
    /// Returns the number of chunks written. Chunks are marked written only once
    /// the whole batch has succeeded.
    #[instrument(skip(self, root), fields(root = %root.hash()))]
    pub async fn persist(&self, root: &Arc<Sequence>) -> Result<usize> {
        if self.is_written(&root.hash()) {
            return Ok(0);
        }

        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![Arc::clone(root)];
        seen.insert(root.hash());

        while let Some(seq) = stack.pop() {
            if let Some(meta) = seq.as_meta() {
                for tuple in meta.tuples() {
                    let hash = tuple.hash();
                    if let Some(child) = tuple.child.sequence() {
                        if !self.is_written(&hash) && seen.insert(hash) {
                            stack.push(Arc::clone(child));
                        }
                    }
                }
            }
            pending.push(seq);
        }

        stream::iter(pending.iter().map(|seq| self.put_sequence(seq)))
            .buffer_unordered(self.config.write_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        for seq in &pending {
            self.written.insert(seq.hash());
        }
        debug!(chunks = pending.len(), "persisted collection");
        Ok(pending.len())
    }
}

impl<S: BlockListing> ValueStore<S> {
    /// Delete every block not reachable from `roots`
    ///
    /// Returns the number of blocks removed. Blocks whose CID does not carry a
    /// BLAKE3 digest are left alone.
    #[instrument(skip(self, roots), fields(roots = roots.len()))]
    pub async fn collect_garbage(&self, roots: &[Hash]) -> Result<usize> {
        let mut reachable = HashSet::new();
        for root in roots {
            let seq = self.read_sequence(*root).await?;
            reachable.extend(walk::chunk_hashes(self, &seq).await?);
        }

        let mut removed = 0;
        for cid in self.blocks.list_blocks().await? {
            let Some(hash) = Hash::from_cid(&cid) else {
                continue;
            };
            if reachable.contains(&hash) {
                continue;
            }
            self.blocks.delete_block(&cid).await?;
            self.written.remove(&hash);
            self.cache.lock().pop(&hash);
            removed += 1;
        }

        debug!(removed, reachable = reachable.len(), "garbage collected");
        Ok(removed)
    }
}
