//! Chunk encoding
//!
//! Every chunk is a self-describing DAG-CBOR record:
//!
//! ```text
//! { kind, elem, value, leaf, level, count, payload }
//! ```
//!
//! where `payload` is one of `Values`, `Entries`, `Bytes` or `Tuples`. DAG-CBOR is
//! canonical, so identical logical content always encodes to identical bytes.

use super::sequence::{
    ChildRef, LeafItems, LeafSequence, MetaSequence, MetaTuple, OrderKey, Sequence,
};
use crate::hash::Hash;
use crate::value::{CollectionType, MapEntry, SequenceKind, Value, ValueType};
use crate::{CoreError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct ChunkRecordRef<'a> {
    kind: SequenceKind,
    elem: ValueType,
    value: Option<ValueType>,
    leaf: bool,
    level: u64,
    count: u64,
    payload: PayloadRef<'a>,
}

#[derive(Serialize)]
enum PayloadRef<'a> {
    Values(&'a [Value]),
    Entries(&'a [MapEntry]),
    Bytes(#[serde(with = "serde_bytes")] &'a [u8]),
    Tuples(Vec<TupleRecordRef<'a>>),
}

#[derive(Serialize)]
struct TupleRecordRef<'a> {
    #[serde(with = "serde_bytes")]
    child: &'a [u8],
    key: &'a OrderKey,
    leaves: u64,
}

#[derive(Deserialize)]
struct ChunkRecord {
    kind: SequenceKind,
    elem: ValueType,
    value: Option<ValueType>,
    leaf: bool,
    level: u64,
    count: u64,
    payload: Payload,
}

#[derive(Deserialize)]
enum Payload {
    Values(Vec<Value>),
    Entries(Vec<MapEntry>),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Tuples(Vec<TupleRecord>),
}

#[derive(Deserialize)]
struct TupleRecord {
    #[serde(with = "serde_bytes")]
    child: Vec<u8>,
    key: OrderKey,
    leaves: u64,
}

fn to_vec(record: &ChunkRecordRef<'_>) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(record).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Encode a leaf chunk
pub fn encode_leaf(ty: &CollectionType, items: &LeafItems) -> Result<Vec<u8>> {
    let payload = match items {
        LeafItems::Values(v) => PayloadRef::Values(v),
        LeafItems::Entries(e) => PayloadRef::Entries(e),
        LeafItems::Bytes(b) => PayloadRef::Bytes(b),
    };
    to_vec(&ChunkRecordRef {
        kind: ty.kind,
        elem: ty.elem,
        value: ty.value,
        leaf: true,
        level: 0,
        count: items.len() as u64,
        payload,
    })
}

/// Encode a meta chunk
pub fn encode_meta(ty: &CollectionType, level: u64, tuples: &[MetaTuple]) -> Result<Vec<u8>> {
    let records = tuples
        .iter()
        .map(|t| TupleRecordRef {
            child: t.child_hash_bytes(),
            key: &t.key,
            leaves: t.num_leaves,
        })
        .collect();
    to_vec(&ChunkRecordRef {
        kind: ty.kind,
        elem: ty.elem,
        value: ty.value,
        leaf: false,
        level,
        count: tuples.len() as u64,
        payload: PayloadRef::Tuples(records),
    })
}

/// Encode any sequence; equal to the bytes it was hashed from
pub fn encode(seq: &Sequence) -> Bytes {
    seq.encoded().clone()
}

/// Decode a chunk fetched under `expected`, verifying its hash first
pub fn decode(bytes: Bytes, expected: Hash) -> Result<Sequence> {
    let actual = Hash::of(&bytes);
    if actual != expected {
        return Err(CoreError::HashMismatch { expected, actual });
    }

    let record: ChunkRecord = serde_ipld_dagcbor::from_slice(&bytes)
        .map_err(|e| CoreError::Deserialization(e.to_string()))?;
    let ty = CollectionType {
        kind: record.kind,
        elem: record.elem,
        value: record.value,
    };

    let malformed = |what: &str| CoreError::Deserialization(format!("chunk {expected}: {what}"));

    let seq = match (record.leaf, record.payload) {
        (true, payload) => {
            let items = match payload {
                Payload::Values(v) => LeafItems::Values(v),
                Payload::Entries(e) => LeafItems::Entries(e),
                Payload::Bytes(b) => LeafItems::Bytes(b),
                Payload::Tuples(_) => return Err(malformed("leaf with tuple payload")),
            };
            if record.level != 0 {
                return Err(malformed("leaf above level 0"));
            }
            let expected_shape = LeafItems::empty(ty.kind);
            if std::mem::discriminant(&expected_shape) != std::mem::discriminant(&items) {
                return Err(malformed("payload does not match kind"));
            }
            if items.len() as u64 != record.count {
                return Err(malformed("item count mismatch"));
            }
            Sequence::Leaf(LeafSequence::from_parts(ty, items, expected, bytes))
        }
        (false, Payload::Tuples(records)) => {
            if record.level == 0 {
                return Err(malformed("meta sequence at level 0"));
            }
            if records.len() as u64 != record.count {
                return Err(malformed("tuple count mismatch"));
            }
            let tuples = records
                .into_iter()
                .map(|r| {
                    Ok(MetaTuple::new(
                        ChildRef::Stored(Hash::from_slice(&r.child)?),
                        r.key,
                        r.leaves,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            Sequence::Meta(MetaSequence::from_parts(ty, record.level, tuples, expected, bytes))
        }
        (false, _) => return Err(malformed("meta sequence without tuples")),
    };

    Ok(seq)
}

impl MetaTuple {
    fn child_hash_bytes(&self) -> &[u8] {
        match &self.child {
            ChildRef::Stored(hash) | ChildRef::InMemory { hash, .. } => hash.as_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn roundtrip(seq: &Sequence) -> Sequence {
        decode(encode(seq), seq.hash()).unwrap()
    }

    #[test]
    fn test_leaf_roundtrip() {
        let leaves = [
            LeafSequence::new(
                CollectionType::list(ValueType::Any),
                LeafItems::Values(vec![
                    Value::Bool(true),
                    Value::Int(-42),
                    Value::from("text"),
                    Value::Bytes(vec![0, 255]),
                    Value::Ref(Hash::of(b"other")),
                ]),
            ),
            LeafSequence::new(
                CollectionType::map(ValueType::String, ValueType::Int),
                LeafItems::Entries(vec![MapEntry::new("a", 1), MapEntry::new("b", 2)]),
            ),
            LeafSequence::new(CollectionType::blob(), LeafItems::Bytes(b"raw bytes".to_vec())),
            LeafSequence::new(CollectionType::set(ValueType::Int), LeafItems::Values(vec![])),
        ];

        for leaf in leaves {
            let seq = Sequence::Leaf(leaf.unwrap());
            assert_eq!(roundtrip(&seq), seq);
        }
    }

    #[test]
    fn test_meta_roundtrip() {
        let ty = CollectionType::set(ValueType::String);
        let child = Arc::new(Sequence::Leaf(
            LeafSequence::new(ty, LeafItems::Values(vec!["x".into(), "y".into()])).unwrap(),
        ));
        let tuples = vec![
            MetaTuple::new(ChildRef::in_memory(child), OrderKey::Value("y".into()), 2),
            MetaTuple::new(
                ChildRef::Stored(Hash::of(b"elsewhere")),
                OrderKey::Hash(Hash::of(b"k")),
                7,
            ),
        ];
        let seq = Sequence::Meta(MetaSequence::new(ty, 1, tuples).unwrap());

        let decoded = roundtrip(&seq);
        assert_eq!(decoded, seq);
        let meta = decoded.as_meta().unwrap();
        assert!(meta.tuples().iter().all(|t| t.child.sequence().is_none()));
        assert_eq!(meta.num_leaves(), 9);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let build = || {
            LeafSequence::new(
                CollectionType::list(ValueType::Int),
                LeafItems::Values((0..100).map(Value::Int).collect()),
            )
            .unwrap()
        };
        assert_eq!(
            encode(&Sequence::Leaf(build())),
            encode(&Sequence::Leaf(build()))
        );
    }

    #[test]
    fn test_decode_detects_hash_mismatch() {
        let seq = Sequence::empty(CollectionType::list(ValueType::Any)).unwrap();
        let wrong = Hash::of(b"not this chunk");

        let err = decode(encode(&seq), wrong).unwrap_err();
        assert!(matches!(err, CoreError::HashMismatch { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let garbage = Bytes::from_static(b"\xff\x00garbage");
        let err = decode(garbage.clone(), Hash::of(&garbage)).unwrap_err();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }
}
