//! Immutable, chunked byte strings

use crate::collection::{Collection, Root};
use crate::hash::Hash;
use crate::prolly::{diff_indexed, IndexedStrategy, Sequence, SequenceItem, Splice};
use crate::store::ValueStore;
use crate::value::{CollectionType, SequenceKind};
use crate::{CoreError, Result};
use std::fmt;
use std::sync::Arc;
use tessera_blockstore::BlockStore;
use tracing::instrument;

/// A byte string chunked by a rolling hash over its bytes
pub struct Blob<S: BlockStore> {
    root: Root<S>,
}

impl<S: BlockStore> Blob<S> {
    pub async fn new(store: Arc<ValueStore<S>>) -> Result<Self> {
        Self::from_bytes(store, &[]).await
    }

    #[instrument(skip(store, data), fields(len = data.len()))]
    pub async fn from_bytes(store: Arc<ValueStore<S>>, data: &[u8]) -> Result<Self> {
        let strategy = IndexedStrategy::new(CollectionType::blob());
        let root = Root::build(store, strategy, data.iter().copied().map(SequenceItem::Byte)).await?;
        Ok(Self { root })
    }

    pub async fn load(store: Arc<ValueStore<S>>, hash: Hash) -> Result<Self> {
        Ok(Self {
            root: Root::load(store, hash, SequenceKind::Blob).await?,
        })
    }

    /// Up to `len` bytes starting at `offset`
    ///
    /// Reads whole leaf slices at a time; an offset past the end yields nothing.
    pub async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(self.len().saturating_sub(offset) as usize));
        if offset >= self.len() || len == 0 {
            return Ok(out);
        }

        let mut cursor = self.root.cursor_at_index(offset).await?;
        while cursor.valid() && out.len() < len {
            let leaf = cursor
                .seq()
                .as_leaf()
                .ok_or_else(|| CoreError::TreeCorruption("blob cursor off leaf level".into()))?;
            let start = cursor.index_in_chunk() as usize;
            let take = (leaf.len() - start).min(len - out.len());
            out.extend_from_slice(&leaf.bytes()[start..start + take]);
            if !cursor.advance_chunk().await? {
                break;
            }
        }
        Ok(out)
    }

    /// The whole blob
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        let leaves = self.root.items().await?;
        Ok(leaves.into_iter().filter_map(SequenceItem::into_byte).collect())
    }

    /// Remove `remove` bytes at `offset` and insert `data` in their place
    #[instrument(skip(self, data), fields(root = %self.hash(), added = data.len()))]
    pub async fn splice(&self, offset: u64, remove: u64, data: &[u8]) -> Result<Self> {
        let len = self.len();
        if offset > len || offset.saturating_add(remove) > len {
            return Err(CoreError::IndexOutOfBounds {
                index: offset.saturating_add(remove),
                len,
            });
        }
        if remove == 0 && data.is_empty() {
            return Ok(self.clone());
        }

        let cursor = self.root.cursor_at_index(offset).await?;
        let strategy = IndexedStrategy::new(*self.collection_type());
        let root = self
            .root
            .edit(cursor, strategy, remove, data.iter().copied().map(SequenceItem::Byte))
            .await?;
        Ok(Self { root })
    }

    pub async fn insert(&self, offset: u64, data: &[u8]) -> Result<Self> {
        self.splice(offset, 0, data).await
    }

    pub async fn remove(&self, offset: u64, len: u64) -> Result<Self> {
        self.splice(offset, len, &[]).await
    }

    pub async fn append(&self, data: &[u8]) -> Result<Self> {
        self.splice(self.len(), 0, data).await
    }

    /// This blob followed by `other`, sharing every chunk of `other` past the
    /// first boundary after the seam
    #[instrument(skip(self, other), fields(root = %self.hash(), other = %other.hash()))]
    pub async fn concat(&self, other: &Blob<S>) -> Result<Self> {
        self.root.same_kind(&other.root)?;
        let strategy = IndexedStrategy::new(*self.collection_type());
        if let Some(root) = self.root.concat(&other.root, strategy).await? {
            return Ok(Self { root });
        }
        let data = other.read_all().await?;
        self.append(&data).await
    }

    /// Byte splices turning `last` into this blob
    pub async fn diff(&self, last: &Blob<S>) -> Result<Vec<Splice>> {
        self.root.same_kind(&last.root)?;
        diff_indexed(&self.root.store, &last.root.seq, &self.root.seq).await
    }

    pub async fn chunks(&self) -> Result<Vec<Hash>> {
        self.root.chunks().await
    }
}

impl<S: BlockStore> Collection for Blob<S> {
    fn sequence(&self) -> &Arc<Sequence> {
        &self.root.seq
    }
}

impl<S: BlockStore> Clone for Blob<S> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<S: BlockStore> PartialEq for Blob<S> {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl<S: BlockStore> Eq for Blob<S> {}

impl<S: BlockStore> fmt::Debug for Blob<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("hash", &self.hash())
            .field("len", &self.len())
            .finish()
    }
}
