//! Immutable, chunked lists

use crate::collection::{Collection, CollectionIter, Root};
use crate::hash::Hash;
use crate::prolly::{diff_indexed, IndexedStrategy, Sequence, SequenceItem, Splice};
use crate::store::ValueStore;
use crate::value::{CollectionType, SequenceKind, Value, ValueType};
use crate::{CoreError, Result};
use std::fmt;
use std::sync::Arc;
use tessera_blockstore::BlockStore;
use tracing::instrument;

/// An ordered, indexable sequence of values
///
/// Every mutator returns a new, persisted list and leaves `self` untouched.
pub struct List<S: BlockStore> {
    root: Root<S>,
}

impl<S: BlockStore> List<S> {
    /// An empty list accepting any value
    pub async fn new(store: Arc<ValueStore<S>>) -> Result<Self> {
        Self::with_type(store, ValueType::Any).await
    }

    /// An empty list of `elem` values
    pub async fn with_type(store: Arc<ValueStore<S>>, elem: ValueType) -> Result<Self> {
        Self::from_typed_values(store, elem, Vec::new()).await
    }

    pub async fn from_values(store: Arc<ValueStore<S>>, values: Vec<Value>) -> Result<Self> {
        Self::from_typed_values(store, ValueType::Any, values).await
    }

    /// Build a list of `elem` values in one chunking pass
    #[instrument(skip(store, values), fields(len = values.len()))]
    pub async fn from_typed_values(
        store: Arc<ValueStore<S>>,
        elem: ValueType,
        values: Vec<Value>,
    ) -> Result<Self> {
        let ty = CollectionType::list(elem);
        for value in &values {
            ty.check_value(value)?;
        }
        let root = Root::build(store, IndexedStrategy::new(ty), values.into_iter().map(SequenceItem::Value)).await?;
        Ok(Self { root })
    }

    /// Open a persisted list
    pub async fn load(store: Arc<ValueStore<S>>, hash: Hash) -> Result<Self> {
        Ok(Self {
            root: Root::load(store, hash, SequenceKind::List).await?,
        })
    }

    fn strategy(&self) -> IndexedStrategy {
        IndexedStrategy::new(*self.collection_type())
    }

    fn check_index(&self, index: u64, len: u64) -> Result<()> {
        if index >= len {
            return Err(CoreError::IndexOutOfBounds { index, len });
        }
        Ok(())
    }

    /// The value at `index`
    pub async fn get(&self, index: u64) -> Result<Value> {
        self.check_index(index, self.len())?;
        let cursor = self.root.cursor_at_index(index).await?;
        cursor
            .current()?
            .into_value()
            .ok_or_else(|| CoreError::TreeCorruption("list leaf without values".into()))
    }

    /// Replace the value at `index`
    #[instrument(skip(self, value), fields(root = %self.hash()))]
    pub async fn set(&self, index: u64, value: Value) -> Result<Self> {
        self.collection_type().check_value(&value)?;
        self.check_index(index, self.len())?;
        self.splice(index, 1, vec![value]).await
    }

    /// Insert `value` before position `index`
    #[instrument(skip(self, value), fields(root = %self.hash()))]
    pub async fn insert(&self, index: u64, value: Value) -> Result<Self> {
        self.splice(index, 0, vec![value]).await
    }

    /// Add `value` at the end
    pub async fn append(&self, value: Value) -> Result<Self> {
        self.splice(self.len(), 0, vec![value]).await
    }

    /// Remove `remove` values at `index` and insert `values` in their place
    #[instrument(skip(self, values), fields(root = %self.hash(), added = values.len()))]
    pub async fn splice(&self, index: u64, remove: u64, values: Vec<Value>) -> Result<Self> {
        for value in &values {
            self.collection_type().check_value(value)?;
        }
        let len = self.len();
        if index > len || index.saturating_add(remove) > len {
            return Err(CoreError::IndexOutOfBounds {
                index: index.saturating_add(remove),
                len,
            });
        }
        if remove == 0 && values.is_empty() {
            return Ok(self.clone());
        }

        let cursor = self.root.cursor_at_index(index).await?;
        let root = self
            .root
            .edit(cursor, self.strategy(), remove, values.into_iter().map(SequenceItem::Value))
            .await?;
        Ok(Self { root })
    }

    /// Remove the values in `start..end`
    pub async fn remove(&self, start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(CoreError::InvalidRange { start, end });
        }
        self.splice(start, end - start, Vec::new()).await
    }

    /// Remove the value at `index`
    pub async fn remove_at(&self, index: u64) -> Result<Self> {
        self.check_index(index, self.len())?;
        self.splice(index, 1, Vec::new()).await
    }

    /// This list followed by `other`
    ///
    /// Lists of the same type in the same store are joined at the seam only,
    /// so the cost is proportional to tree height. Otherwise the values of
    /// `other` are type-checked and appended.
    #[instrument(skip(self, other), fields(root = %self.hash(), other = %other.hash()))]
    pub async fn concat(&self, other: &List<S>) -> Result<Self> {
        self.root.same_kind(&other.root)?;
        if let Some(root) = self.root.concat(&other.root, self.strategy()).await? {
            return Ok(Self { root });
        }
        let values = other.values().await?;
        self.splice(self.len(), 0, values).await
    }

    /// Iterate from the first value
    pub async fn iterator(&self) -> Result<CollectionIter<S, Value>> {
        self.iterator_at(0).await
    }

    /// Iterate from position `index`
    pub async fn iterator_at(&self, index: u64) -> Result<CollectionIter<S, Value>> {
        let cursor = self.root.cursor_at_index(index).await?;
        Ok(CollectionIter::new(cursor, SequenceItem::into_value))
    }

    /// All values, with leaves fetched concurrently
    pub async fn values(&self) -> Result<Vec<Value>> {
        Ok(self
            .root
            .items()
            .await?
            .into_iter()
            .filter_map(SequenceItem::into_value)
            .collect())
    }

    /// Splices turning `last` into this list
    pub async fn diff(&self, last: &List<S>) -> Result<Vec<Splice>> {
        self.root.same_kind(&last.root)?;
        diff_indexed(&self.root.store, &last.root.seq, &self.root.seq).await
    }

    /// Hashes of every chunk in the tree
    pub async fn chunks(&self) -> Result<Vec<Hash>> {
        self.root.chunks().await
    }
}

impl<S: BlockStore> Collection for List<S> {
    fn sequence(&self) -> &Arc<Sequence> {
        &self.root.seq
    }
}

impl<S: BlockStore> Clone for List<S> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<S: BlockStore> PartialEq for List<S> {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl<S: BlockStore> Eq for List<S> {}

impl<S: BlockStore> fmt::Debug for List<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("hash", &self.hash())
            .field("len", &self.len())
            .finish()
    }
}
