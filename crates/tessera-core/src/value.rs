//! Value model for collection elements
//!
//! Collections hold [`Value`]s (lists and sets), [`MapEntry`] pairs (maps), or raw
//! bytes (blobs). Each value has a stable fingerprint digest that feeds the
//! boundary checker and orders values that are too large to compare directly.

use crate::hash::Hash;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single element value
///
/// The derived order compares the variant first (`Bool < Int < String < Bytes < Ref`)
/// and then the payload.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Root hash of another collection
    Ref(Hash),
}

impl Value {
    /// The type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Ref(_) => ValueType::Ref,
        }
    }

    /// Stable fingerprint digest of this value
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        match self {
            Value::Bool(b) => {
                hasher.update(&[0, *b as u8]);
            }
            Value::Int(n) => {
                hasher.update(&[1]);
                hasher.update(&n.to_be_bytes());
            }
            Value::String(s) => {
                hasher.update(&[2]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Value::Bytes(b) => {
                hasher.update(&[3]);
                hasher.update(&(b.len() as u64).to_le_bytes());
                hasher.update(b);
            }
            Value::Ref(h) => {
                hasher.update(&[4]);
                hasher.update(h.as_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Whether ordered collections compare this value directly
    ///
    /// Byte strings and refs are ordered by their fingerprint digest instead.
    pub fn is_ordered_by_value(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::String(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_ref_hash(&self) -> Option<Hash> {
        match self {
            Value::Ref(h) => Some(*h),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Ref(h) => write!(f, "#{h}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Hash> for Value {
    fn from(h: Hash) -> Self {
        Value::Ref(h)
    }
}

/// Declared type of collection elements, keys or values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[default]
    Any,
    Bool,
    Int,
    String,
    Bytes,
    Ref,
}

impl ValueType {
    /// Check whether a value conforms to this type
    pub fn accepts(&self, value: &Value) -> bool {
        *self == ValueType::Any || *self == value.value_type()
    }

    /// Fail with `TypeMismatch` unless the value conforms
    pub fn check(&self, value: &Value) -> Result<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(CoreError::TypeMismatch {
                expected: *self,
                actual: value.value_type(),
            })
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Ref => "ref",
        };
        f.write_str(name)
    }
}

/// The four collection kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceKind {
    List,
    Set,
    Map,
    Blob,
}

impl SequenceKind {
    /// Indexed kinds route by cumulative element count
    pub fn is_indexed(&self) -> bool {
        matches!(self, SequenceKind::List | SequenceKind::Blob)
    }

    /// Ordered kinds route by maximum key
    pub fn is_ordered(&self) -> bool {
        !self.is_indexed()
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequenceKind::List => "list",
            SequenceKind::Set => "set",
            SequenceKind::Map => "map",
            SequenceKind::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Kind plus element type descriptor of a collection
///
/// For maps `elem` is the key type and `value` the value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionType {
    pub kind: SequenceKind,
    pub elem: ValueType,
    pub value: Option<ValueType>,
}

impl CollectionType {
    pub fn list(elem: ValueType) -> Self {
        Self {
            kind: SequenceKind::List,
            elem,
            value: None,
        }
    }

    pub fn set(elem: ValueType) -> Self {
        Self {
            kind: SequenceKind::Set,
            elem,
            value: None,
        }
    }

    pub fn map(key: ValueType, value: ValueType) -> Self {
        Self {
            kind: SequenceKind::Map,
            elem: key,
            value: Some(value),
        }
    }

    pub fn blob() -> Self {
        Self {
            kind: SequenceKind::Blob,
            elem: ValueType::Int,
            value: None,
        }
    }

    /// Check an element of a list or set
    pub fn check_value(&self, value: &Value) -> Result<()> {
        self.elem.check(value)
    }

    /// Check a key/value pair of a map
    pub fn check_entry(&self, key: &Value, value: &Value) -> Result<()> {
        self.elem.check(key)?;
        self.value.unwrap_or_default().check(value)
    }

    /// Fail with `KindMismatch` unless this type has the expected kind
    pub fn expect_kind(&self, expected: SequenceKind) -> Result<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(CoreError::KindMismatch {
                expected,
                actual: self.kind,
            })
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.value) {
            (SequenceKind::Blob, _) => f.write_str("blob"),
            (kind, Some(value)) => write!(f, "{kind}<{}, {value}>", self.elem),
            (kind, None) => write!(f, "{kind}<{}>", self.elem),
        }
    }
}

/// A key/value pair stored in a map leaf
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

impl MapEntry {
    pub fn new(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Fingerprint of the full entry: key digest followed by value digest
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.key.hash().as_bytes());
        hasher.update(self.value.hash().as_bytes());
        hasher.finalize().into()
    }
}
