//! Immutable, chunked sets

use crate::collection::{Collection, CollectionIter, Root};
use crate::hash::Hash;
use crate::prolly::{diff_ordered, KeyValueChange, OrderKey, OrderedStrategy, Sequence, SequenceItem};
use crate::store::ValueStore;
use crate::value::{CollectionType, SequenceKind, Value, ValueType};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tessera_blockstore::BlockStore;
use tracing::instrument;

/// A sorted set of distinct values
///
/// Elements are ordered by [`OrderKey`]: booleans, integers and strings by
/// value, byte strings and refs by digest after all of those.
pub struct Set<S: BlockStore> {
    root: Root<S>,
}

impl<S: BlockStore> Set<S> {
    pub async fn new(store: Arc<ValueStore<S>>) -> Result<Self> {
        Self::with_type(store, ValueType::Any).await
    }

    pub async fn with_type(store: Arc<ValueStore<S>>, elem: ValueType) -> Result<Self> {
        Self::from_typed_values(store, elem, Vec::new()).await
    }

    /// Build a set from values in any order; duplicates collapse
    pub async fn from_values(store: Arc<ValueStore<S>>, values: Vec<Value>) -> Result<Self> {
        Self::from_typed_values(store, ValueType::Any, values).await
    }

    #[instrument(skip(store, values), fields(len = values.len()))]
    pub async fn from_typed_values(
        store: Arc<ValueStore<S>>,
        elem: ValueType,
        values: Vec<Value>,
    ) -> Result<Self> {
        let ty = CollectionType::set(elem);
        for value in &values {
            ty.check_value(value)?;
        }

        let mut keyed: Vec<(OrderKey, Value)> = values
            .into_iter()
            .map(|v| (OrderKey::of_value(&v), v))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);

        let root = Root::build(
            store,
            OrderedStrategy::new(ty),
            keyed.into_iter().map(|(_, v)| SequenceItem::Value(v)),
        )
        .await?;
        Ok(Self { root })
    }

    pub async fn load(store: Arc<ValueStore<S>>, hash: Hash) -> Result<Self> {
        Ok(Self {
            root: Root::load(store, hash, SequenceKind::Set).await?,
        })
    }

    fn strategy(&self) -> OrderedStrategy {
        OrderedStrategy::new(*self.collection_type())
    }

    pub async fn has(&self, value: &Value) -> Result<bool> {
        let (_, found) = self.root.find(&OrderKey::of_value(value)).await?;
        Ok(found.is_some())
    }

    /// The smallest element
    pub async fn first(&self) -> Result<Option<Value>> {
        self.iterator().await?.next().await
    }

    /// Add `value`; an existing element returns an equal set
    #[instrument(skip(self, value), fields(root = %self.hash()))]
    pub async fn insert(&self, value: Value) -> Result<Self> {
        self.collection_type().check_value(&value)?;
        let (cursor, found) = self.root.find(&OrderKey::of_value(&value)).await?;
        if found.is_some() {
            return Ok(self.clone());
        }
        let root = self
            .root
            .edit(cursor, self.strategy(), 0, [SequenceItem::Value(value)])
            .await?;
        Ok(Self { root })
    }

    /// Drop `value`; an absent element returns an equal set
    #[instrument(skip(self, value), fields(root = %self.hash()))]
    pub async fn remove(&self, value: &Value) -> Result<Self> {
        let (cursor, found) = self.root.find(&OrderKey::of_value(value)).await?;
        if found.is_none() {
            return Ok(self.clone());
        }
        let root = self.root.edit(cursor, self.strategy(), 1, std::iter::empty()).await?;
        Ok(Self { root })
    }

    pub async fn iterator(&self) -> Result<CollectionIter<S, Value>> {
        let cursor = self.root.cursor_at_index(0).await?;
        Ok(CollectionIter::new(cursor, SequenceItem::into_value))
    }

    /// Iterate from the first element `>= value`
    pub async fn iterator_at(&self, value: &Value) -> Result<CollectionIter<S, Value>> {
        let cursor = self.root.cursor_at_key(&OrderKey::of_value(value)).await?;
        Ok(CollectionIter::new(cursor, SequenceItem::into_value))
    }

    /// All elements in order, with leaves fetched concurrently
    pub async fn values(&self) -> Result<Vec<Value>> {
        Ok(self
            .root
            .items()
            .await?
            .into_iter()
            .filter_map(SequenceItem::into_value)
            .collect())
    }

    /// Elements added and removed since `last`
    pub async fn diff(&self, last: &Set<S>) -> Result<Vec<KeyValueChange<Value, Value>>> {
        self.root.same_kind(&last.root)?;
        diff_ordered(&self.root.store, &last.root.seq, &self.root.seq).await
    }

    pub async fn chunks(&self) -> Result<Vec<Hash>> {
        self.root.chunks().await
    }
}

impl<S: BlockStore> Collection for Set<S> {
    fn sequence(&self) -> &Arc<Sequence> {
        &self.root.seq
    }
}

impl<S: BlockStore> Clone for Set<S> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<S: BlockStore> PartialEq for Set<S> {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl<S: BlockStore> Eq for Set<S> {}

impl<S: BlockStore> fmt::Debug for Set<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Set")
            .field("hash", &self.hash())
            .field("len", &self.len())
            .finish()
    }
}
