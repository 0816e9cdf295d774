//! Immutable, chunked maps

use crate::collection::{Collection, CollectionIter, Root};
use crate::hash::Hash;
use crate::prolly::{diff_ordered, KeyValueChange, OrderKey, OrderedStrategy, Sequence, SequenceItem};
use crate::store::ValueStore;
use crate::value::{CollectionType, MapEntry, SequenceKind, Value, ValueType};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tessera_blockstore::BlockStore;
use tracing::instrument;

/// A sorted map from keys to values
pub struct Map<S: BlockStore> {
    root: Root<S>,
}

impl<S: BlockStore> Map<S> {
    pub async fn new(store: Arc<ValueStore<S>>) -> Result<Self> {
        Self::with_types(store, ValueType::Any, ValueType::Any).await
    }

    pub async fn with_types(store: Arc<ValueStore<S>>, key: ValueType, value: ValueType) -> Result<Self> {
        Self::from_typed_entries(store, key, value, Vec::new()).await
    }

    /// Build a map from pairs in any order; the last pair for a key wins
    pub async fn from_entries(store: Arc<ValueStore<S>>, entries: Vec<(Value, Value)>) -> Result<Self> {
        Self::from_typed_entries(store, ValueType::Any, ValueType::Any, entries).await
    }

    #[instrument(skip(store, entries), fields(len = entries.len()))]
    pub async fn from_typed_entries(
        store: Arc<ValueStore<S>>,
        key: ValueType,
        value: ValueType,
        entries: Vec<(Value, Value)>,
    ) -> Result<Self> {
        let ty = CollectionType::map(key, value);
        for (k, v) in &entries {
            ty.check_entry(k, v)?;
        }

        let mut keyed: Vec<(OrderKey, MapEntry)> = entries
            .into_iter()
            .map(|(k, v)| (OrderKey::of_value(&k), MapEntry::new(k, v)))
            .collect();
        // Stable sort keeps insertion order among equal keys
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut sorted: Vec<(OrderKey, MapEntry)> = Vec::with_capacity(keyed.len());
        for (k, entry) in keyed {
            match sorted.last_mut() {
                Some(last) if last.0 == k => last.1 = entry,
                _ => sorted.push((k, entry)),
            }
        }

        let root = Root::build(
            store,
            OrderedStrategy::new(ty),
            sorted.into_iter().map(|(_, e)| SequenceItem::Entry(e)),
        )
        .await?;
        Ok(Self { root })
    }

    pub async fn load(store: Arc<ValueStore<S>>, hash: Hash) -> Result<Self> {
        Ok(Self {
            root: Root::load(store, hash, SequenceKind::Map).await?,
        })
    }

    fn strategy(&self) -> OrderedStrategy {
        OrderedStrategy::new(*self.collection_type())
    }

    /// The value stored under `key`
    pub async fn get(&self, key: &Value) -> Result<Option<Value>> {
        let (_, found) = self.root.find(&OrderKey::of_value(key)).await?;
        Ok(found.and_then(SequenceItem::into_entry).map(|e| e.value))
    }

    pub async fn has(&self, key: &Value) -> Result<bool> {
        let (_, found) = self.root.find(&OrderKey::of_value(key)).await?;
        Ok(found.is_some())
    }

    /// The entry with the smallest key
    pub async fn first(&self) -> Result<Option<MapEntry>> {
        self.iterator().await?.next().await
    }

    /// Bind `key` to `value`; an identical binding returns an equal map
    #[instrument(skip(self, key, value), fields(root = %self.hash()))]
    pub async fn set(&self, key: Value, value: Value) -> Result<Self> {
        self.collection_type().check_entry(&key, &value)?;
        let (cursor, found) = self.root.find(&OrderKey::of_value(&key)).await?;
        let remove = match found.and_then(SequenceItem::into_entry) {
            Some(existing) if existing.value == value => return Ok(self.clone()),
            Some(_) => 1,
            None => 0,
        };
        let root = self
            .root
            .edit(cursor, self.strategy(), remove, [SequenceItem::Entry(MapEntry::new(key, value))])
            .await?;
        Ok(Self { root })
    }

    /// Drop `key`; an absent key returns an equal map
    #[instrument(skip(self, key), fields(root = %self.hash()))]
    pub async fn remove(&self, key: &Value) -> Result<Self> {
        let (cursor, found) = self.root.find(&OrderKey::of_value(key)).await?;
        if found.is_none() {
            return Ok(self.clone());
        }
        let root = self.root.edit(cursor, self.strategy(), 1, std::iter::empty()).await?;
        Ok(Self { root })
    }

    pub async fn iterator(&self) -> Result<CollectionIter<S, MapEntry>> {
        let cursor = self.root.cursor_at_index(0).await?;
        Ok(CollectionIter::new(cursor, SequenceItem::into_entry))
    }

    /// Iterate from the first key `>= key`
    pub async fn iterator_at(&self, key: &Value) -> Result<CollectionIter<S, MapEntry>> {
        let cursor = self.root.cursor_at_key(&OrderKey::of_value(key)).await?;
        Ok(CollectionIter::new(cursor, SequenceItem::into_entry))
    }

    /// All entries in key order, with leaves fetched concurrently
    pub async fn entries(&self) -> Result<Vec<MapEntry>> {
        Ok(self
            .root
            .items()
            .await?
            .into_iter()
            .filter_map(SequenceItem::into_entry)
            .collect())
    }

    /// Keys added, removed and modified since `last`
    pub async fn diff(&self, last: &Map<S>) -> Result<Vec<KeyValueChange<Value, Value>>> {
        self.root.same_kind(&last.root)?;
        diff_ordered(&self.root.store, &last.root.seq, &self.root.seq).await
    }

    pub async fn chunks(&self) -> Result<Vec<Hash>> {
        self.root.chunks().await
    }
}

impl<S: BlockStore> Collection for Map<S> {
    fn sequence(&self) -> &Arc<Sequence> {
        &self.root.seq
    }
}

impl<S: BlockStore> Clone for Map<S> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<S: BlockStore> PartialEq for Map<S> {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl<S: BlockStore> Eq for Map<S> {}

impl<S: BlockStore> fmt::Debug for Map<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("hash", &self.hash())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkConfig;
    use crate::prolly::ChangeType;
    use crate::CoreError;
    use rstest::rstest;
    use tessera_blockstore::MemoryBlockStore;

    fn store() -> Arc<ValueStore<MemoryBlockStore>> {
        Arc::new(ValueStore::with_config(Arc::new(MemoryBlockStore::new()), ChunkConfig::small()).unwrap())
    }

    fn pairs(n: i64) -> Vec<(Value, Value)> {
        (0..n).map(|k| (Value::Int(k), Value::from(format!("v{k}")))).collect()
    }

    #[tokio::test]
    async fn test_get_and_has() {
        let map = Map::from_entries(store(), pairs(300)).await.unwrap();

        assert_eq!(map.len(), 300);
        assert_eq!(map.get(&Value::Int(123)).await.unwrap(), Some(Value::from("v123")));
        assert_eq!(map.get(&Value::Int(300)).await.unwrap(), None);
        assert!(map.has(&Value::Int(0)).await.unwrap());
        assert!(!map.has(&Value::from("0")).await.unwrap());
    }

    #[tokio::test]
    async fn test_last_duplicate_wins() {
        let map = Map::from_entries(
            store(),
            vec![
                (1.into(), "a".into()),
                (2.into(), "b".into()),
                (1.into(), "c".into()),
            ],
        )
        .await
        .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1.into()).await.unwrap(), Some("c".into()));
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let map = Map::from_entries(store(), pairs(200)).await.unwrap();

        let once = map.set(Value::Int(50), Value::from("new")).await.unwrap();
        let twice = once.set(Value::Int(50), Value::from("new")).await.unwrap();
        assert_eq!(once, twice);
        assert_ne!(once, map);

        let restored = once.set(Value::Int(50), Value::from("v50")).await.unwrap();
        assert_eq!(restored, map);
    }

    #[rstest]
    #[case(ValueType::Int, ValueType::String, Value::from("k"), Value::from("v"))]
    #[case(ValueType::Int, ValueType::String, Value::Int(1), Value::Int(2))]
    #[tokio::test]
    async fn test_typed_map_rejects(
        #[case] key_type: ValueType,
        #[case] value_type: ValueType,
        #[case] key: Value,
        #[case] value: Value,
    ) {
        let map = Map::with_types(store(), key_type, value_type).await.unwrap();
        assert!(matches!(
            map.set(key, value).await,
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_absent_is_identity() {
        let map = Map::from_entries(store(), pairs(40)).await.unwrap();
        assert_eq!(map.remove(&Value::Int(-1)).await.unwrap(), map);

        let removed = map.remove(&Value::Int(7)).await.unwrap();
        assert_eq!(removed.len(), 39);
        assert_eq!(removed.get(&Value::Int(7)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_strictly_increasing() {
        let map = Map::from_entries(store(), pairs(500).into_iter().rev().collect())
            .await
            .unwrap();

        let keys: Vec<_> = map.entries().await.unwrap().into_iter().map(|e| e.key).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(map.first().await.unwrap(), Some(MapEntry::new(0, "v0")));
    }

    #[tokio::test]
    async fn test_diff_reports_modification() {
        let store = store();
        let old = Map::from_entries(Arc::clone(&store), pairs(100)).await.unwrap();
        let new = old.set(Value::Int(42), Value::from("x")).await.unwrap();

        let changes = new.diff(&old).await.unwrap();
        assert_eq!(
            changes,
            vec![KeyValueChange::modify(Value::Int(42), Value::from("v42"), Value::from("x"))]
        );
        assert_eq!(changes[0].change_type, ChangeType::Modify);
    }
}
