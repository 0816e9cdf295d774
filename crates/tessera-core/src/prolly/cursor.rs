//! Sequence cursor
//!
//! A cursor is a path of `(sequence, index)` frames from a position in some tree
//! level up to the root. Moving past the end of one chunk ascends to the nearest
//! ancestor that can move and descends into the neighbouring child.

use super::sequence::{MetaSequence, OrderKey, Sequence, SequenceItem};
use crate::store::ValueStore;
use crate::{CoreError, Result};
use std::sync::Arc;
use tessera_blockstore::BlockStore;

fn non_empty_meta(seq: &Sequence) -> Result<&MetaSequence> {
    match seq.as_meta() {
        Some(meta) if !meta.is_empty() => Ok(meta),
        _ => Err(CoreError::TreeCorruption(format!(
            "cannot descend into chunk {}",
            seq.hash()
        ))),
    }
}

#[derive(Clone, Debug)]
struct Frame {
    seq: Arc<Sequence>,
    idx: isize,
}

/// A position inside a chunked sequence
///
/// `frames[0]` is the cursor's own level, the last frame is the root. Seeking
/// past either end produces an invalid cursor rather than an error; only
/// dereferencing it fails.
pub struct SequenceCursor<S: BlockStore> {
    store: Arc<ValueStore<S>>,
    frames: Vec<Frame>,
}

impl<S: BlockStore> Clone for SequenceCursor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            frames: self.frames.clone(),
        }
    }
}

impl<S: BlockStore> std::fmt::Debug for SequenceCursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.frames.iter().map(|fr| (fr.seq.hash(), fr.idx)))
            .finish()
    }
}

impl<S: BlockStore> SequenceCursor<S> {
    /// Cursor at absolute leaf position `index`
    ///
    /// An index at or past the end leaves the cursor just past the last item.
    pub async fn at_index(store: Arc<ValueStore<S>>, root: Arc<Sequence>, index: u64) -> Result<Self> {
        let mut frames = Vec::new();
        let mut seq = root;
        let mut remaining = index;

        while !seq.is_leaf() {
            let (idx, child) = {
                let meta = non_empty_meta(&seq)?;
                let (idx, before) = meta.child_for_index(remaining);
                remaining -= before;
                (idx, store.child_sequence(&meta.tuples()[idx]).await?)
            };
            frames.push(Frame {
                seq,
                idx: idx as isize,
            });
            seq = child;
        }

        let idx = remaining.min(seq.len() as u64) as isize;
        frames.push(Frame { seq, idx });
        frames.reverse();
        Ok(Self { store, frames })
    }

    /// Cursor at the first item whose key is `>= key`
    ///
    /// Meta levels fall back to their last child, so a key greater than every
    /// item leaves the cursor just past the end of the last leaf.
    pub async fn at_key(store: Arc<ValueStore<S>>, root: Arc<Sequence>, key: &OrderKey) -> Result<Self> {
        let mut frames = Vec::new();
        let mut seq = root;

        while !seq.is_leaf() {
            let (idx, child) = {
                let meta = non_empty_meta(&seq)?;
                let idx = seq.search(key).min(meta.len() - 1);
                (idx, store.child_sequence(&meta.tuples()[idx]).await?)
            };
            frames.push(Frame {
                seq,
                idx: idx as isize,
            });
            seq = child;
        }

        let idx = seq.search(key) as isize;
        frames.push(Frame { seq, idx });
        frames.reverse();
        Ok(Self { store, frames })
    }

    /// The store this cursor reads through
    pub fn store(&self) -> &Arc<ValueStore<S>> {
        &self.store
    }

    /// The sequence at the cursor's own level
    pub fn seq(&self) -> &Arc<Sequence> {
        &self.frames[0].seq
    }

    pub fn index_in_chunk(&self) -> isize {
        self.frames[0].idx
    }

    /// Length of the current chunk
    pub fn length(&self) -> usize {
        self.frames[0].seq.len()
    }

    /// Number of levels from here to the root, including this one
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn valid(&self) -> bool {
        let f = &self.frames[0];
        f.idx >= 0 && (f.idx as usize) < f.seq.len()
    }

    /// The item under the cursor
    pub fn current(&self) -> Result<SequenceItem> {
        let f = &self.frames[0];
        if !self.valid() {
            return Err(CoreError::InvalidCursor {
                index: f.idx as i64,
                len: f.seq.len(),
            });
        }
        f.seq.item(f.idx as usize).ok_or(CoreError::InvalidCursor {
            index: f.idx as i64,
            len: f.seq.len(),
        })
    }

    /// The ordering key of the item under the cursor
    pub fn current_key(&self) -> Result<OrderKey> {
        let f = &self.frames[0];
        if !self.valid() {
            return Err(CoreError::InvalidCursor {
                index: f.idx as i64,
                len: f.seq.len(),
            });
        }
        Ok(f.seq.order_key(f.idx as usize))
    }

    /// A cursor over the parent level, if there is one
    pub fn parent(&self) -> Option<Self> {
        (self.frames.len() > 1).then(|| Self {
            store: Arc::clone(&self.store),
            frames: self.frames[1..].to_vec(),
        })
    }

    /// Absolute position among the leaves of the whole tree
    pub fn absolute_index(&self) -> u64 {
        let own = self.frames[0].idx.max(0) as u64;
        self.frames[1..]
            .iter()
            .filter_map(|f| f.seq.as_meta().map(|m| m.leaves_before(f.idx.max(0) as usize)))
            .sum::<u64>()
            + own
    }

    /// Move to the next item; false once past the end
    pub async fn advance(&mut self) -> Result<bool> {
        self.advance_maybe_allow_past_end(true).await
    }

    /// Move to the next item
    ///
    /// At the end of the last chunk the cursor only steps past the end when
    /// `allow_past_end` is set; otherwise it stays on the last item.
    pub async fn advance_maybe_allow_past_end(&mut self, allow_past_end: bool) -> Result<bool> {
        let own = &mut self.frames[0];
        let len = own.seq.len() as isize;
        if own.idx < len - 1 {
            own.idx += 1;
            return Ok(true);
        }
        if own.idx == len {
            return Ok(false);
        }

        let mut pivot = None;
        for level in 1..self.frames.len() {
            let f = &mut self.frames[level];
            let len = f.seq.len() as isize;
            if f.idx < len - 1 {
                f.idx += 1;
                pivot = Some(level);
                break;
            }
            if f.idx == len {
                break;
            }
        }

        match pivot {
            Some(pivot) => {
                self.descend(pivot, false).await?;
                Ok(true)
            }
            None => {
                if allow_past_end {
                    self.frames[0].idx += 1;
                }
                Ok(false)
            }
        }
    }

    /// Move to the previous item; false once before the start
    pub async fn retreat(&mut self) -> Result<bool> {
        self.retreat_maybe_allow_before_start(true).await
    }

    /// Move to the previous item
    ///
    /// At the start of the first chunk the cursor only steps before the start
    /// when `allow_before_start` is set; otherwise it stays on the first item.
    pub async fn retreat_maybe_allow_before_start(&mut self, allow_before_start: bool) -> Result<bool> {
        let own = &mut self.frames[0];
        if own.idx > 0 {
            own.idx -= 1;
            return Ok(true);
        }
        if own.idx == -1 {
            return Ok(false);
        }

        let mut pivot = None;
        for level in 1..self.frames.len() {
            let f = &mut self.frames[level];
            if f.idx > 0 {
                f.idx -= 1;
                pivot = Some(level);
                break;
            }
            if f.idx == -1 {
                break;
            }
        }

        match pivot {
            Some(pivot) => {
                self.descend(pivot, true).await?;
                Ok(true)
            }
            None => {
                if allow_before_start {
                    self.frames[0].idx -= 1;
                }
                Ok(false)
            }
        }
    }

    /// Skip the rest of the current chunk; false if there is no next chunk
    pub async fn advance_chunk(&mut self) -> Result<bool> {
        let len = self.length() as isize;
        if len > 0 && self.frames[0].idx < len - 1 {
            self.frames[0].idx = len - 1;
        }
        self.advance().await
    }

    /// Re-sync every frame below `pivot` with its parent's position
    async fn descend(&mut self, pivot: usize, at_end: bool) -> Result<()> {
        for level in (0..pivot).rev() {
            let parent = &self.frames[level + 1];
            let meta = parent.seq.as_meta().ok_or_else(|| {
                CoreError::TreeCorruption("cursor parent is not a meta sequence".into())
            })?;
            let child = self.store.child_sequence(&meta.tuples()[parent.idx as usize]).await?;
            let idx = if at_end { child.len() as isize - 1 } else { 0 };
            self.frames[level] = Frame { seq: child, idx };
        }
        Ok(())
    }
}
