//! Sequence chunker: the incremental rewrite engine
//!
//! A chunker is built over a cursor at an edit point. It replays the items from
//! the start of the enclosing chunk (priming the boundary checker with the window
//! before it), accepts skips and appends, and on [`SequenceChunker::done`] pulls
//! following items until its boundaries line up with the original ones again.
//! Every level of the tree gets the same treatment, bottom-up; everything outside
//! the rewritten neighbourhood is reused by hash.

use super::boundary::BoundaryChecker;
use super::cursor::SequenceCursor;
use super::sequence::{
    ChildRef, LeafItems, LeafSequence, MetaSequence, MetaTuple, OrderKey, Sequence, SequenceItem,
};
use crate::store::ValueStore;
use crate::value::CollectionType;
use crate::{CoreError, Result};
use std::sync::Arc;
use tessera_blockstore::BlockStore;
use tracing::trace;

/// How a collection kind summarises chunks for its parent level
pub trait ChunkStrategy: Send + Sync {
    /// Type descriptor written into every chunk
    fn collection_type(&self) -> &CollectionType;

    /// Order key of a freshly built leaf
    fn leaf_key(&self, leaf: &LeafSequence) -> OrderKey;

    /// Order key of a freshly built meta sequence
    fn meta_key(&self, tuples: &[MetaTuple]) -> OrderKey;
}

/// Lists and blobs: keys are leaf counts
#[derive(Clone, Debug)]
pub struct IndexedStrategy {
    ty: CollectionType,
}

impl IndexedStrategy {
    pub fn new(ty: CollectionType) -> Self {
        Self { ty }
    }
}

impl ChunkStrategy for IndexedStrategy {
    fn collection_type(&self) -> &CollectionType {
        &self.ty
    }

    fn leaf_key(&self, leaf: &LeafSequence) -> OrderKey {
        OrderKey::Count(leaf.len() as u64)
    }

    fn meta_key(&self, tuples: &[MetaTuple]) -> OrderKey {
        OrderKey::Count(tuples.iter().map(|t| t.num_leaves).sum())
    }
}

/// Sets and maps: keys are the largest key in the chunk
#[derive(Clone, Debug)]
pub struct OrderedStrategy {
    ty: CollectionType,
}

impl OrderedStrategy {
    pub fn new(ty: CollectionType) -> Self {
        Self { ty }
    }
}

impl ChunkStrategy for OrderedStrategy {
    fn collection_type(&self) -> &CollectionType {
        &self.ty
    }

    fn leaf_key(&self, leaf: &LeafSequence) -> OrderKey {
        match leaf.len() {
            0 => OrderKey::Count(0),
            n => leaf.order_key(n - 1),
        }
    }

    fn meta_key(&self, tuples: &[MetaTuple]) -> OrderKey {
        tuples
            .last()
            .map(|t| t.key.clone())
            .unwrap_or(OrderKey::Count(0))
    }
}

/// Working state of one tree level
struct ChunkerLevel<S: BlockStore> {
    /// Position in the original tree; `None` for levels the tree never had
    cursor: Option<SequenceCursor<S>>,
    /// Items of the chunk being built
    current: Vec<SequenceItem>,
    boundary: BoundaryChecker,
}

/// Incremental chunker over all levels of one tree
///
/// Level 0 holds leaf items, level `n` holds tuples pointing at level `n - 1`.
pub struct SequenceChunker<S: BlockStore, T: ChunkStrategy> {
    store: Arc<ValueStore<S>>,
    strategy: T,
    levels: Vec<ChunkerLevel<S>>,
}

impl<S: BlockStore, T: ChunkStrategy> SequenceChunker<S, T> {
    /// A chunker for a brand new sequence
    pub fn new_empty(store: Arc<ValueStore<S>>, strategy: T) -> Self {
        let mut chunker = Self {
            store,
            strategy,
            levels: Vec::new(),
        };
        chunker.push_level(None);
        chunker
    }

    /// A chunker positioned at `cursor` in an existing sequence
    pub async fn new(cursor: SequenceCursor<S>, strategy: T) -> Result<Self> {
        let store = Arc::clone(cursor.store());
        let mut chunker = Self {
            store,
            strategy,
            levels: Vec::new(),
        };

        let mut next = Some(cursor);
        while let Some(cursor) = next {
            next = cursor.parent();
            chunker.push_level(Some(cursor));
        }

        // Parents first: resuming a level may append finished chunks to its parent
        for level in (0..chunker.levels.len()).rev() {
            chunker.resume(level).await?;
        }

        Ok(chunker)
    }

    /// `fst` followed by `snd`
    ///
    /// Chunking resumes at the end of `fst` and continues into `snd` only until
    /// boundaries line up with the ones `snd` already has; from there on every
    /// chunk of `snd` is reused, at each level. Both trees must live in `store`
    /// and share the strategy's collection type.
    pub async fn concat(
        store: Arc<ValueStore<S>>,
        fst: &Arc<Sequence>,
        snd: &Arc<Sequence>,
        strategy: T,
    ) -> Result<Arc<Sequence>> {
        if fst.num_leaves() == 0 {
            return Ok(Arc::clone(snd));
        }
        if snd.num_leaves() == 0 {
            return Ok(Arc::clone(fst));
        }

        let end = SequenceCursor::at_index(Arc::clone(&store), Arc::clone(fst), fst.num_leaves()).await?;
        let mut chunker = Self::new(end, strategy).await?;

        // Swap the cursors over `fst` for cursors at the start of `snd`. Levels
        // above the top of `snd` lose theirs, dropping the last tuple of `fst`
        // there since its content is re-emitted from below.
        let mut next = Some(SequenceCursor::at_index(store, Arc::clone(snd), 0).await?);
        let mut level = 0;
        while level < chunker.levels.len() {
            let parent = next.as_ref().and_then(SequenceCursor::parent);
            chunker.levels[level].cursor = next;
            if parent.is_some() && level + 1 == chunker.levels.len() {
                chunker.push_level(None);
            }
            next = parent;
            level += 1;
        }

        chunker.done().await
    }

    fn push_level(&mut self, cursor: Option<SequenceCursor<S>>) {
        let level = self.levels.len();
        let kind = self.strategy.collection_type().kind;
        self.levels.push(ChunkerLevel {
            cursor,
            current: Vec::new(),
            boundary: BoundaryChecker::for_level(kind, level, self.store.config()),
        });
    }

    /// Rebuild the state of `level` as if its items had just been appended
    async fn resume(&mut self, level: usize) -> Result<()> {
        let Some(cursor) = self.levels[level].cursor.as_ref() else {
            return Ok(());
        };

        let mut prime_window = self.levels[level].boundary.window_size().saturating_sub(1);
        let mut retreater = cursor.clone();
        let mut append_count = 0usize;
        let mut prime_count = 0usize;

        // Past the end, the previous item may itself have closed a chunk, so it
        // must be re-tested rather than just replayed
        let append_penultimate = cursor.index_in_chunk() == cursor.length() as isize;
        if append_penultimate && retreater.retreat_maybe_allow_before_start(false).await? {
            append_count += 1;
            prime_count += 1;
        }

        while retreater.index_in_chunk() > 0
            && retreater.retreat_maybe_allow_before_start(false).await?
        {
            append_count += 1;
            if prime_window > 0 {
                prime_count += 1;
                prime_window -= 1;
            }
        }

        while prime_window > 0 && retreater.retreat_maybe_allow_before_start(false).await? {
            prime_count += 1;
            prime_window -= 1;
        }

        while prime_count > 0 || append_count > 0 {
            let item = retreater.current()?;
            if prime_count > append_count {
                // Before the current chunk: hash only
                self.levels[level].boundary.write(&item);
                prime_count -= 1;
            } else if append_count > prime_count {
                // In the current chunk, before the window: keep only
                self.levels[level].current.push(item);
                append_count -= 1;
            } else {
                if append_penultimate && append_count == 1 {
                    self.append_at(level, item)?;
                } else {
                    self.levels[level].boundary.write(&item);
                    self.levels[level].current.push(item);
                }
                append_count -= 1;
                prime_count -= 1;
            }
            retreater.advance().await?;
        }

        Ok(())
    }

    /// Append a new item at the edit point
    pub fn append(&mut self, item: SequenceItem) -> Result<()> {
        self.append_at(0, item)
    }

    /// Drop the item under the cursor from the result
    pub async fn skip(&mut self) -> Result<()> {
        if self.levels[0].cursor.is_none() {
            return Err(CoreError::TreeCorruption(
                "skip on a chunker without a cursor".into(),
            ));
        }
        self.skip_at(0).await
    }

    fn append_at(&mut self, level: usize, item: SequenceItem) -> Result<()> {
        let state = &mut self.levels[level];
        let at_boundary = state.boundary.write_in_chunk(&item, state.current.len() + 1);
        state.current.push(item);
        if at_boundary {
            self.handle_chunk_boundary(level)?;
        }
        Ok(())
    }

    /// Advance the cursor of `level`; entering a new chunk skips the parent too
    async fn skip_at(&mut self, level: usize) -> Result<()> {
        let mut level = level;
        while let Some(cursor) = self.levels.get_mut(level).and_then(|l| l.cursor.as_mut()) {
            if !(cursor.advance().await? && cursor.index_in_chunk() == 0) {
                break;
            }
            level += 1;
        }
        Ok(())
    }

    async fn skip_parent_if_exists(&mut self, level: usize) -> Result<()> {
        self.skip_at(level + 1).await
    }

    /// Close the chunk being built at `level` and hand its tuple to the parent
    fn handle_chunk_boundary(&mut self, level: usize) -> Result<()> {
        let items = std::mem::take(&mut self.levels[level].current);
        if items.is_empty() {
            return Err(CoreError::TreeCorruption(format!(
                "empty chunk at level {level}"
            )));
        }
        let (_, tuple) = self.make_chunk(level, items)?;
        if level + 1 == self.levels.len() {
            self.push_level(None);
        }
        self.append_at(level + 1, SequenceItem::Tuple(tuple))
    }

    fn make_chunk(&self, level: usize, items: Vec<SequenceItem>) -> Result<(Arc<Sequence>, MetaTuple)> {
        let ty = *self.strategy.collection_type();
        let (seq, key) = if level == 0 {
            let leaf = LeafSequence::new(ty, LeafItems::from_items(ty.kind, items)?)?;
            let key = self.strategy.leaf_key(&leaf);
            (Sequence::Leaf(leaf), key)
        } else {
            let tuples = items
                .into_iter()
                .map(SequenceItem::into_tuple)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    CoreError::TreeCorruption(format!("non-tuple item at level {level}"))
                })?;
            let key = self.strategy.meta_key(&tuples);
            (Sequence::Meta(MetaSequence::new(ty, level as u64, tuples)?), key)
        };

        let seq = Arc::new(seq);
        trace!(level, items = seq.len(), hash = %seq.hash(), "emitted chunk");
        let tuple = MetaTuple::new(ChildRef::in_memory(Arc::clone(&seq)), key, seq.num_leaves());
        Ok((seq, tuple))
    }

    /// Feed the original items after the edit until boundaries resynchronise
    async fn finalize_cursor(&mut self, level: usize) -> Result<()> {
        let Some(cursor) = self.levels[level].cursor.as_ref() else {
            return Ok(());
        };

        if !cursor.valid() {
            // Past the end the parent still points at its last chunk, which
            // must not be emitted twice
            return self.skip_parent_if_exists(level).await;
        }

        let window = self.levels[level].boundary.window_size();
        let mut finalizer = cursor.clone();
        let mut i = 0;

        // A full window must be re-hashed before the original boundaries hold
        // again. Length bounds depend on where the open chunk started, so whole
        // original chunks are replayed until one of them ends exactly where a
        // new chunk closes.
        while i < window || finalizer.index_in_chunk() > 0 || !self.levels[level].current.is_empty() {
            if i == 0 || finalizer.index_in_chunk() == 0 {
                // Any original chunk we step into is replaced
                self.skip_parent_if_exists(level).await?;
            }
            let item = finalizer.current()?;
            self.append_at(level, item)?;
            if !finalizer.advance().await? {
                break;
            }
            i += 1;
        }

        Ok(())
    }

    fn any_pending_above(&self, level: usize) -> bool {
        self.levels[level + 1..]
            .iter()
            .any(|l| !l.current.is_empty())
    }

    /// Finish the rewrite and return the new root
    ///
    /// The root is the topmost level with content; a root holding a single tuple
    /// collapses into its child (repeatedly) so the tree never grows a chain.
    pub async fn done(mut self) -> Result<Arc<Sequence>> {
        let mut level = 0;
        loop {
            self.finalize_cursor(level).await?;

            if !self.any_pending_above(level) {
                if level == 0 {
                    let items = std::mem::take(&mut self.levels[0].current);
                    let (seq, _) = self.make_chunk(0, items)?;
                    return Ok(seq);
                }

                if self.levels[level].current.len() == 1 {
                    let Some(SequenceItem::Tuple(tuple)) = self.levels[level].current.pop() else {
                        return Err(CoreError::TreeCorruption(format!(
                            "non-tuple item at level {level}"
                        )));
                    };
                    return self.collapse(&tuple).await;
                }
            }

            if !self.levels[level].current.is_empty() {
                self.handle_chunk_boundary(level)?;
            }

            level += 1;
            if level >= self.levels.len() {
                return Err(CoreError::TreeCorruption(
                    "chunker ran out of levels".into(),
                ));
            }
        }
    }

    /// Walk down through single-tuple meta sequences
    async fn collapse(&self, tuple: &MetaTuple) -> Result<Arc<Sequence>> {
        let mut seq = self.store.child_sequence(tuple).await?;
        loop {
            let only_child = match seq.as_meta() {
                Some(meta) if meta.len() == 1 => meta.tuples()[0].clone(),
                _ => return Ok(seq),
            };
            seq = self.store.child_sequence(&only_child).await?;
        }
    }
}
