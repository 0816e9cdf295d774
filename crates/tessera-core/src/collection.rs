//! Shared plumbing of the collection façades
//!
//! Every collection is a store handle plus a root sequence. Reads drive a
//! [`SequenceCursor`]; writes drive a [`SequenceChunker`] positioned by that
//! cursor and persist the result before returning it.

use crate::hash::Hash;
use crate::prolly::{ChunkStrategy, OrderKey, Sequence, SequenceChunker, SequenceCursor, SequenceItem};
use crate::store::ValueStore;
use crate::value::{CollectionType, SequenceKind};
use crate::walk;
use crate::{CoreError, Result};
use futures::stream::{self, Stream};
use std::sync::Arc;
use tessera_blockstore::BlockStore;

/// Read-only view shared by all collection kinds
pub trait Collection {
    /// Root sequence of the tree
    fn sequence(&self) -> &Arc<Sequence>;

    /// Content address of the root chunk
    fn hash(&self) -> Hash {
        self.sequence().hash()
    }

    fn collection_type(&self) -> &CollectionType {
        self.sequence().ty()
    }

    /// Number of items (bytes for blobs)
    fn len(&self) -> u64 {
        self.sequence().num_leaves()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store handle plus root, the state every façade wraps
pub(crate) struct Root<S: BlockStore> {
    pub(crate) store: Arc<ValueStore<S>>,
    pub(crate) seq: Arc<Sequence>,
}

impl<S: BlockStore> Clone for Root<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            seq: Arc::clone(&self.seq),
        }
    }
}

impl<S: BlockStore> Root<S> {
    /// Chunk `items` from scratch and persist the tree
    pub(crate) async fn build<T: ChunkStrategy>(
        store: Arc<ValueStore<S>>,
        strategy: T,
        items: impl IntoIterator<Item = SequenceItem>,
    ) -> Result<Self> {
        let mut chunker = SequenceChunker::new_empty(Arc::clone(&store), strategy);
        for item in items {
            chunker.append(item)?;
        }
        let seq = chunker.done().await?;
        store.persist(&seq).await?;
        Ok(Self { store, seq })
    }

    /// Open a persisted tree, checking its kind
    pub(crate) async fn load(store: Arc<ValueStore<S>>, hash: Hash, kind: SequenceKind) -> Result<Self> {
        let seq = store.read_sequence(hash).await?;
        seq.ty().expect_kind(kind)?;
        Ok(Self { store, seq })
    }

    pub(crate) async fn cursor_at_index(&self, index: u64) -> Result<SequenceCursor<S>> {
        SequenceCursor::at_index(Arc::clone(&self.store), Arc::clone(&self.seq), index).await
    }

    pub(crate) async fn cursor_at_key(&self, key: &OrderKey) -> Result<SequenceCursor<S>> {
        SequenceCursor::at_key(Arc::clone(&self.store), Arc::clone(&self.seq), key).await
    }

    /// Cursor at `key` in an ordered tree, plus the item there if its key matches
    pub(crate) async fn find(&self, key: &OrderKey) -> Result<(SequenceCursor<S>, Option<SequenceItem>)> {
        let cursor = self.cursor_at_key(key).await?;
        if !cursor.valid() || cursor.current_key()? != *key {
            return Ok((cursor, None));
        }
        let item = cursor.current()?;
        Ok((cursor, Some(item)))
    }

    /// Skip `remove` items at `cursor`, insert `insert` there, and persist
    pub(crate) async fn edit<T: ChunkStrategy>(
        &self,
        cursor: SequenceCursor<S>,
        strategy: T,
        remove: u64,
        insert: impl IntoIterator<Item = SequenceItem>,
    ) -> Result<Self> {
        let mut chunker = SequenceChunker::new(cursor, strategy).await?;
        for _ in 0..remove {
            chunker.skip().await?;
        }
        for item in insert {
            chunker.append(item)?;
        }
        let seq = chunker.done().await?;
        self.store.persist(&seq).await?;
        Ok(Self {
            store: Arc::clone(&self.store),
            seq,
        })
    }

    /// This tree followed by `other`, reusing `other`'s chunks past the seam
    ///
    /// Returns `None` when the chunks cannot be shared: the trees live in
    /// different stores or carry different collection types.
    pub(crate) async fn concat<T: ChunkStrategy>(&self, other: &Root<S>, strategy: T) -> Result<Option<Self>> {
        if !Arc::ptr_eq(&self.store, &other.store) || self.seq.ty() != other.seq.ty() {
            return Ok(None);
        }
        let seq = SequenceChunker::concat(Arc::clone(&self.store), &self.seq, &other.seq, strategy).await?;
        self.store.persist(&seq).await?;
        Ok(Some(Self {
            store: Arc::clone(&self.store),
            seq,
        }))
    }

    pub(crate) async fn chunks(&self) -> Result<Vec<Hash>> {
        walk::chunk_hashes(&self.store, &self.seq).await
    }

    /// All leaf items in order, leaves fetched concurrently
    pub(crate) async fn items(&self) -> Result<Vec<SequenceItem>> {
        let leaves = walk::leaf_sequences(&self.store, &self.seq).await?;
        Ok(leaves
            .iter()
            .filter_map(|seq| seq.as_leaf())
            .flat_map(|leaf| (0..leaf.len()).filter_map(|i| leaf.item(i)))
            .collect())
    }

    /// Fail unless `other` lives in a collection of the same kind
    pub(crate) fn same_kind(&self, other: &Root<S>) -> Result<()> {
        self.seq.ty().expect_kind(other.seq.kind())
    }
}

/// Forward iterator over a collection
///
/// Items are converted as they are read; the iterator is finished once the
/// underlying cursor runs past the end.
pub struct CollectionIter<S: BlockStore, T> {
    cursor: SequenceCursor<S>,
    convert: fn(SequenceItem) -> Option<T>,
}

impl<S: BlockStore, T> CollectionIter<S, T> {
    pub(crate) fn new(cursor: SequenceCursor<S>, convert: fn(SequenceItem) -> Option<T>) -> Self {
        Self { cursor, convert }
    }

    /// The next item, or `None` at the end
    pub async fn next(&mut self) -> Result<Option<T>> {
        if !self.cursor.valid() {
            return Ok(None);
        }
        let item = self.cursor.current()?;
        self.cursor.advance().await?;
        (self.convert)(item)
            .map(Some)
            .ok_or_else(|| CoreError::TreeCorruption("unexpected item shape".into()))
    }

    /// Drain the remaining items
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    /// Adapt into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::try_unfold(self, |mut iter| async move {
            Ok(iter.next().await?.map(|item| (item, iter)))
        })
    }
}
