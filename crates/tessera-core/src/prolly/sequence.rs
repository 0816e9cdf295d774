//! Leaf and meta sequences
//!
//! A collection is a tree of immutable sequences. Leaves hold the items; meta
//! sequences hold [`MetaTuple`]s that point at child sequences by hash and carry an
//! [`OrderKey`] summarising the child for routing.

use super::codec;
use crate::hash::Hash;
use crate::value::{CollectionType, MapEntry, SequenceKind, Value};
use crate::{CoreError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Per-subtree routing summary
///
/// Variants are ordered `Count < Value < Hash`, so every key compared by value
/// sorts before every key compared by digest.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderKey {
    /// Leaf count of the subtree (lists and blobs)
    Count(u64),
    /// Maximum key of the subtree, compared directly
    Value(Value),
    /// Maximum key of the subtree, compared by fingerprint digest
    Hash(Hash),
}

impl OrderKey {
    /// The key a set element or map key sorts by
    pub fn of_value(value: &Value) -> Self {
        if value.is_ordered_by_value() {
            OrderKey::Value(value.clone())
        } else {
            OrderKey::Hash(value.hash())
        }
    }
}

/// Reference from a meta tuple to its child sequence
///
/// Chunks produced by the chunker stay in memory until the collection is
/// persisted; chunks decoded from the store are referenced by hash only.
#[derive(Clone)]
pub enum ChildRef {
    Stored(Hash),
    InMemory { hash: Hash, sequence: Arc<Sequence> },
}

impl ChildRef {
    /// Reference a freshly built sequence
    pub fn in_memory(sequence: Arc<Sequence>) -> Self {
        ChildRef::InMemory {
            hash: sequence.hash(),
            sequence,
        }
    }

    pub fn hash(&self) -> Hash {
        match self {
            ChildRef::Stored(hash) | ChildRef::InMemory { hash, .. } => *hash,
        }
    }

    /// The child sequence, if it is held in memory
    pub fn sequence(&self) -> Option<&Arc<Sequence>> {
        match self {
            ChildRef::Stored(_) => None,
            ChildRef::InMemory { sequence, .. } => Some(sequence),
        }
    }
}

impl PartialEq for ChildRef {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for ChildRef {}

impl fmt::Debug for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildRef::Stored(hash) => write!(f, "Stored({hash:?})"),
            ChildRef::InMemory { hash, .. } => write!(f, "InMemory({hash:?})"),
        }
    }
}

/// One pointer entry in a meta sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaTuple {
    pub child: ChildRef,
    pub key: OrderKey,
    pub num_leaves: u64,
}

impl MetaTuple {
    pub fn new(child: ChildRef, key: OrderKey, num_leaves: u64) -> Self {
        Self {
            child,
            key,
            num_leaves,
        }
    }

    /// Hash of the child sequence
    pub fn hash(&self) -> Hash {
        self.child.hash()
    }
}

/// An element of any sequence, as seen by cursors and the chunker
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceItem {
    Value(Value),
    Entry(MapEntry),
    Byte(u8),
    Tuple(MetaTuple),
}

impl SequenceItem {
    pub fn into_value(self) -> Option<Value> {
        match self {
            SequenceItem::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_entry(self) -> Option<MapEntry> {
        match self {
            SequenceItem::Entry(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_byte(self) -> Option<u8> {
        match self {
            SequenceItem::Byte(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_tuple(self) -> Option<MetaTuple> {
        match self {
            SequenceItem::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Key this item sorts by inside an ordered collection
    pub fn order_key(&self) -> Option<OrderKey> {
        match self {
            SequenceItem::Value(v) => Some(OrderKey::of_value(v)),
            SequenceItem::Entry(e) => Some(OrderKey::of_value(&e.key)),
            SequenceItem::Tuple(t) => Some(t.key.clone()),
            SequenceItem::Byte(_) => None,
        }
    }
}

/// Item storage of a leaf, one variant per leaf shape
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafItems {
    Values(Vec<Value>),
    Entries(Vec<MapEntry>),
    Bytes(Vec<u8>),
}

impl LeafItems {
    /// Empty storage of the right shape for a kind
    pub fn empty(kind: SequenceKind) -> Self {
        match kind {
            SequenceKind::List | SequenceKind::Set => LeafItems::Values(Vec::new()),
            SequenceKind::Map => LeafItems::Entries(Vec::new()),
            SequenceKind::Blob => LeafItems::Bytes(Vec::new()),
        }
    }

    /// Gather chunker items into storage of the right shape for a kind
    pub fn from_items(kind: SequenceKind, items: Vec<SequenceItem>) -> Result<Self> {
        let mismatch = || CoreError::TreeCorruption(format!("foreign item in {kind} leaf"));
        Ok(match kind {
            SequenceKind::List | SequenceKind::Set => LeafItems::Values(
                items
                    .into_iter()
                    .map(SequenceItem::into_value)
                    .collect::<Option<_>>()
                    .ok_or_else(mismatch)?,
            ),
            SequenceKind::Map => LeafItems::Entries(
                items
                    .into_iter()
                    .map(SequenceItem::into_entry)
                    .collect::<Option<_>>()
                    .ok_or_else(mismatch)?,
            ),
            SequenceKind::Blob => LeafItems::Bytes(
                items
                    .into_iter()
                    .map(SequenceItem::into_byte)
                    .collect::<Option<_>>()
                    .ok_or_else(mismatch)?,
            ),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            LeafItems::Values(v) => v.len(),
            LeafItems::Entries(e) => e.len(),
            LeafItems::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(&self, kind: SequenceKind) -> bool {
        matches!(
            (self, kind),
            (LeafItems::Values(_), SequenceKind::List | SequenceKind::Set)
                | (LeafItems::Entries(_), SequenceKind::Map)
                | (LeafItems::Bytes(_), SequenceKind::Blob)
        )
    }
}

/// Terminal sequence holding collection items
#[derive(Clone, Debug, PartialEq)]
pub struct LeafSequence {
    ty: CollectionType,
    items: LeafItems,
    hash: Hash,
    encoded: Bytes,
}

impl LeafSequence {
    /// Build and hash a leaf
    pub fn new(ty: CollectionType, items: LeafItems) -> Result<Self> {
        if !items.matches(ty.kind) {
            return Err(CoreError::TreeCorruption(format!(
                "leaf items do not match kind {}",
                ty.kind
            )));
        }
        let encoded = Bytes::from(codec::encode_leaf(&ty, &items)?);
        Ok(Self {
            hash: Hash::of(&encoded),
            ty,
            items,
            encoded,
        })
    }

    /// Reassemble a decoded leaf whose hash has already been verified
    pub(crate) fn from_parts(ty: CollectionType, items: LeafItems, hash: Hash, encoded: Bytes) -> Self {
        Self {
            ty,
            items,
            hash,
            encoded,
        }
    }

    pub fn items(&self) -> &LeafItems {
        &self.items
    }

    pub fn values(&self) -> &[Value] {
        match &self.items {
            LeafItems::Values(v) => v,
            _ => &[],
        }
    }

    pub fn entries(&self) -> &[MapEntry] {
        match &self.items {
            LeafItems::Entries(e) => e,
            _ => &[],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.items {
            LeafItems::Bytes(b) => b,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, idx: usize) -> Option<SequenceItem> {
        match &self.items {
            LeafItems::Values(v) => v.get(idx).cloned().map(SequenceItem::Value),
            LeafItems::Entries(e) => e.get(idx).cloned().map(SequenceItem::Entry),
            LeafItems::Bytes(b) => b.get(idx).copied().map(SequenceItem::Byte),
        }
    }

    /// Ordering key of the item at `idx`
    ///
    /// Indexed leaves report the running count, ordered leaves the element key.
    pub fn order_key(&self, idx: usize) -> OrderKey {
        match &self.items {
            LeafItems::Values(v) if self.ty.kind.is_ordered() => OrderKey::of_value(&v[idx]),
            LeafItems::Entries(e) => OrderKey::of_value(&e[idx].key),
            _ => OrderKey::Count(idx as u64 + 1),
        }
    }

    fn item_eq(&self, idx: usize, other: &LeafSequence, other_idx: usize) -> bool {
        match (&self.items, &other.items) {
            (LeafItems::Values(a), LeafItems::Values(b)) => a[idx] == b[other_idx],
            (LeafItems::Entries(a), LeafItems::Entries(b)) => a[idx] == b[other_idx],
            (LeafItems::Bytes(a), LeafItems::Bytes(b)) => a[idx] == b[other_idx],
            _ => false,
        }
    }
}

/// Internal tree node: an ordered run of meta tuples
#[derive(Clone, Debug, PartialEq)]
pub struct MetaSequence {
    ty: CollectionType,
    level: u64,
    tuples: Vec<MetaTuple>,
    cumulative: Vec<u64>,
    hash: Hash,
    encoded: Bytes,
}

impl MetaSequence {
    /// Build and hash a meta sequence one level above its children
    pub fn new(ty: CollectionType, level: u64, tuples: Vec<MetaTuple>) -> Result<Self> {
        if level == 0 {
            return Err(CoreError::TreeCorruption("meta sequence at level 0".into()));
        }
        let encoded = Bytes::from(codec::encode_meta(&ty, level, &tuples)?);
        Ok(Self::from_parts(ty, level, tuples, Hash::of(&encoded), encoded))
    }

    pub(crate) fn from_parts(
        ty: CollectionType,
        level: u64,
        tuples: Vec<MetaTuple>,
        hash: Hash,
        encoded: Bytes,
    ) -> Self {
        let cumulative = tuples
            .iter()
            .scan(0u64, |sum, t| {
                *sum += t.num_leaves;
                Some(*sum)
            })
            .collect();
        Self {
            ty,
            level,
            tuples,
            cumulative,
            hash,
            encoded,
        }
    }

    pub fn tuples(&self) -> &[MetaTuple] {
        &self.tuples
    }

    pub fn tuple(&self, idx: usize) -> Option<&MetaTuple> {
        self.tuples.get(idx)
    }

    pub fn level(&self) -> u64 {
        self.level
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Leaves under tuples `0..=idx`
    pub fn cumulative_leaves(&self, idx: usize) -> u64 {
        self.cumulative[idx]
    }

    /// Leaves under the first `n` tuples
    pub fn leaves_before(&self, n: usize) -> u64 {
        if n == 0 {
            0
        } else {
            self.cumulative[n - 1]
        }
    }

    /// Index of the child holding absolute leaf `index`, and the leaves before it
    ///
    /// Clamps to the last child when `index` is past the end.
    pub fn child_for_index(&self, index: u64) -> (usize, u64) {
        let mut idx = self.cumulative.partition_point(|&c| c <= index);
        if idx == self.tuples.len() {
            idx = idx.saturating_sub(1);
        }
        (idx, self.leaves_before(idx))
    }

    pub fn num_leaves(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }
}

/// A leaf or meta sequence
#[derive(Clone, Debug, PartialEq)]
pub enum Sequence {
    Leaf(LeafSequence),
    Meta(MetaSequence),
}

impl Sequence {
    /// An empty leaf for a collection type
    pub fn empty(ty: CollectionType) -> Result<Self> {
        Ok(Sequence::Leaf(LeafSequence::new(ty, LeafItems::empty(ty.kind))?))
    }

    pub fn ty(&self) -> &CollectionType {
        match self {
            Sequence::Leaf(l) => &l.ty,
            Sequence::Meta(m) => &m.ty,
        }
    }

    pub fn kind(&self) -> SequenceKind {
        self.ty().kind
    }

    pub fn hash(&self) -> Hash {
        match self {
            Sequence::Leaf(l) => l.hash,
            Sequence::Meta(m) => m.hash,
        }
    }

    /// The encoded chunk bytes
    pub fn encoded(&self) -> &Bytes {
        match self {
            Sequence::Leaf(l) => &l.encoded,
            Sequence::Meta(m) => &m.encoded,
        }
    }

    /// Number of items in this sequence alone
    pub fn len(&self) -> usize {
        match self {
            Sequence::Leaf(l) => l.len(),
            Sequence::Meta(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of leaf items under this sequence
    pub fn num_leaves(&self) -> u64 {
        match self {
            Sequence::Leaf(l) => l.len() as u64,
            Sequence::Meta(m) => m.num_leaves(),
        }
    }

    /// Tree level, 0 for leaves
    pub fn level(&self) -> u64 {
        match self {
            Sequence::Leaf(_) => 0,
            Sequence::Meta(m) => m.level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Sequence::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafSequence> {
        match self {
            Sequence::Leaf(l) => Some(l),
            Sequence::Meta(_) => None,
        }
    }

    pub fn as_meta(&self) -> Option<&MetaSequence> {
        match self {
            Sequence::Meta(m) => Some(m),
            Sequence::Leaf(_) => None,
        }
    }

    /// Item at `idx`, `None` when out of range
    pub fn item(&self, idx: usize) -> Option<SequenceItem> {
        match self {
            Sequence::Leaf(l) => l.item(idx),
            Sequence::Meta(m) => m.tuple(idx).cloned().map(SequenceItem::Tuple),
        }
    }

    /// Ordering key at `idx`; panics when out of range
    pub fn order_key(&self, idx: usize) -> OrderKey {
        match self {
            Sequence::Leaf(l) => l.order_key(idx),
            Sequence::Meta(m) => m.tuples[idx].key.clone(),
        }
    }

    /// Smallest index whose key is `>= key`, or `len()` if there is none
    pub fn search(&self, key: &OrderKey) -> usize {
        let len = self.len();
        let (mut lo, mut hi) = (0, len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.order_key(mid) < *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Compare items across two sequences of the same shape
    ///
    /// Meta tuples are equal when their child hashes are.
    pub fn item_eq(&self, idx: usize, other: &Sequence, other_idx: usize) -> bool {
        match (self, other) {
            (Sequence::Leaf(a), Sequence::Leaf(b)) => a.item_eq(idx, b, other_idx),
            (Sequence::Meta(a), Sequence::Meta(b)) => {
                a.tuples[idx].hash() == b.tuples[other_idx].hash()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn int_leaf(values: &[i64]) -> LeafSequence {
        LeafSequence::new(
            CollectionType::list(ValueType::Int),
            LeafItems::Values(values.iter().map(|&n| Value::Int(n)).collect()),
        )
        .unwrap()
    }

    #[test]
    fn test_order_key_ordering() {
        assert!(OrderKey::Count(u64::MAX) < OrderKey::Value(Value::Bool(false)));
        assert!(OrderKey::Value(Value::from("zzz")) < OrderKey::Hash(Hash::default()));
        assert_eq!(
            OrderKey::of_value(&Value::Bytes(vec![1, 2])),
            OrderKey::Hash(Value::Bytes(vec![1, 2]).hash())
        );
    }

    #[test]
    fn test_leaf_hash_depends_on_content() {
        assert_eq!(int_leaf(&[1, 2, 3]).hash, int_leaf(&[1, 2, 3]).hash);
        assert_ne!(int_leaf(&[1, 2, 3]).hash, int_leaf(&[1, 2, 4]).hash);
    }

    #[test]
    fn test_leaf_rejects_wrong_shape() {
        let result = LeafSequence::new(CollectionType::blob(), LeafItems::Values(vec![]));
        assert!(matches!(result, Err(CoreError::TreeCorruption(_))));
    }

    #[test]
    fn test_meta_cumulative_routing() {
        let ty = CollectionType::list(ValueType::Int);
        let tuples: Vec<_> = [3u64, 2, 4]
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let leaf = Arc::new(Sequence::Leaf(int_leaf(&vec![i as i64; n as usize])));
                MetaTuple::new(ChildRef::in_memory(leaf), OrderKey::Count(n), n)
            })
            .collect();
        let meta = MetaSequence::new(ty, 1, tuples).unwrap();

        assert_eq!(meta.num_leaves(), 9);
        assert_eq!(meta.child_for_index(0), (0, 0));
        assert_eq!(meta.child_for_index(2), (0, 0));
        assert_eq!(meta.child_for_index(3), (1, 3));
        assert_eq!(meta.child_for_index(8), (2, 5));
        assert_eq!(meta.child_for_index(100), (2, 5));
    }

    #[test]
    fn test_ordered_search() {
        let ty = CollectionType::set(ValueType::Int);
        let leaf = Sequence::Leaf(
            LeafSequence::new(ty, LeafItems::Values(vec![1.into(), 5.into(), 9.into()])).unwrap(),
        );

        assert_eq!(leaf.search(&OrderKey::Value(0.into())), 0);
        assert_eq!(leaf.search(&OrderKey::Value(5.into())), 1);
        assert_eq!(leaf.search(&OrderKey::Value(6.into())), 2);
        assert_eq!(leaf.search(&OrderKey::Value(10.into())), 3);
    }

    #[test]
    fn test_child_ref_equality_ignores_residency() {
        let leaf = Arc::new(Sequence::Leaf(int_leaf(&[1])));
        let stored = ChildRef::Stored(leaf.hash());
        assert_eq!(stored, ChildRef::in_memory(leaf));
    }
}
