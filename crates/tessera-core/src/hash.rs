//! Content hashes
//!
//! Every chunk is addressed by the BLAKE3 digest of its encoded bytes. The same
//! digest travels inside the CID handed to the block store, so conversion between
//! the two is lossless.

use crate::{CoreError, Result};
use cid::Cid;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tessera_blockstore::{cid_from_digest, digest_of, CidCodec};

/// Size of a hash digest in bytes
pub const HASH_BYTE_SIZE: usize = 32;

/// A 32-byte BLAKE3 content digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_BYTE_SIZE]);

impl Hash {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; HASH_BYTE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; HASH_BYTE_SIZE] {
        &self.0
    }

    /// The CID under which the block store keeps this chunk
    pub fn to_cid(&self) -> Cid {
        cid_from_digest(&self.0, CidCodec::Raw)
    }

    /// Recover the hash from a CID produced by [`Hash::to_cid`]
    ///
    /// Returns `None` if the CID does not carry a BLAKE3 digest.
    pub fn from_cid(cid: &Cid) -> Option<Self> {
        digest_of(cid).map(Self)
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from lowercase or uppercase hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::Deserialization(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Parse from a byte slice of exactly [`HASH_BYTE_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let digest: [u8; HASH_BYTE_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::Deserialization(format!(
                "hash must be {HASH_BYTE_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(digest))
    }

    /// First eight digest bytes as a little-endian integer
    ///
    /// Used as the rolling-hash fingerprint of whatever this digest identifies.
    pub fn prefix_u64(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(prefix)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..12])
    }
}

impl From<blake3::Hash> for Hash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct HashVisitor;

impl<'de> Visitor<'de> for HashVisitor {
    type Value = Hash;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {HASH_BYTE_SIZE}-byte digest or its hex encoding")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Hash, E> {
        Hash::from_hex(v).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Hash, E> {
        Hash::from_slice(v).map_err(|_| E::invalid_length(v.len(), &self))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Hash, A::Error> {
        let mut bytes = [0u8; HASH_BYTE_SIZE];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(Hash(bytes))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(HashVisitor)
        } else {
            deserializer.deserialize_bytes(HashVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_blake3() {
        let data = b"prolly";
        assert_eq!(Hash::of(data).as_bytes(), blake3::hash(data).as_bytes());
    }

    #[test]
    fn test_cid_roundtrip() {
        let hash = Hash::of(b"chunk");
        let cid = hash.to_cid();

        assert_eq!(Hash::from_cid(&cid), Some(hash));
        assert_eq!(cid, tessera_blockstore::create_cid(b"chunk", CidCodec::Raw));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = Hash::of(b"hex");
        let parsed = Hash::from_hex(&hash.to_string()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_bad_hex_is_rejected() {
        assert!(Hash::from_hex("abcd").is_err());
        assert!(Hash::from_hex("zz").is_err());
    }

    #[test]
    fn test_json_uses_hex() {
        let hash = Hash::of(b"json");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));

        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_dagcbor_roundtrip() {
        let hash = Hash::of(b"cbor");
        let bytes = serde_ipld_dagcbor::to_vec(&hash).unwrap();
        let back: Hash = serde_ipld_dagcbor::from_slice(&bytes).unwrap();
        assert_eq!(back, hash);
    }
}
