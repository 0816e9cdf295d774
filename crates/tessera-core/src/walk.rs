//! Level-by-level tree traversal
//!
//! Both walks fetch one tree level at a time with the store's read concurrency,
//! so the number of sequential round trips equals the tree height.

use crate::hash::Hash;
use crate::prolly::{MetaTuple, Sequence};
use crate::store::ValueStore;
use crate::Result;
use std::sync::Arc;
use tessera_blockstore::BlockStore;

/// Every chunk hash in the tree under `root`, root first, level by level
///
/// Only meta chunks are fetched; leaf hashes come from their parents' tuples.
pub async fn chunk_hashes<S: BlockStore>(
    store: &ValueStore<S>,
    root: &Arc<Sequence>,
) -> Result<Vec<Hash>> {
    let mut hashes = vec![root.hash()];
    let mut frontier = vec![Arc::clone(root)];

    while !frontier.is_empty() {
        let mut inner: Vec<MetaTuple> = Vec::new();
        for seq in &frontier {
            let Some(meta) = seq.as_meta() else {
                continue;
            };
            hashes.extend(meta.tuples().iter().map(MetaTuple::hash));
            if meta.level() > 1 {
                inner.extend(meta.tuples().iter().cloned());
            }
        }
        frontier = store.read_children(&inner).await?;
    }

    Ok(hashes)
}

/// All leaves under `root`, in order
pub async fn leaf_sequences<S: BlockStore>(
    store: &ValueStore<S>,
    root: &Arc<Sequence>,
) -> Result<Vec<Arc<Sequence>>> {
    let mut level = vec![Arc::clone(root)];

    while level.first().is_some_and(|seq| !seq.is_leaf()) {
        let tuples: Vec<MetaTuple> = level
            .iter()
            .filter_map(|seq| seq.as_meta())
            .flat_map(|meta| meta.tuples().iter().cloned())
            .collect();
        level = store.read_children(&tuples).await?;
    }

    Ok(level)
}
