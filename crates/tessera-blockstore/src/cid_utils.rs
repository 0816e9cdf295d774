//! CID (Content Identifier) utilities
//!
//! Creates content-addressed identifiers using BLAKE3

use cid::{Cid, Version};
use multihash::Multihash;
use multihash_codetable::{Code, MultihashDigest};

/// Multicodec code of the BLAKE3-256 multihash
pub const BLAKE3_MULTIHASH_CODE: u64 = 0x1e;

/// Length of a BLAKE3 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Supported IPLD codecs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CidCodec {
    /// Raw binary data (0x55)
    #[default]
    Raw,
    /// DAG-CBOR (0x71)
    DagCbor,
}

impl CidCodec {
    /// Get the multicodec code
    pub fn code(&self) -> u64 {
        match self {
            CidCodec::Raw => 0x55,
            CidCodec::DagCbor => 0x71,
        }
    }

    /// Parse from multicodec code
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(CidCodec::Raw),
            0x71 => Some(CidCodec::DagCbor),
            _ => None,
        }
    }

    /// Get a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CidCodec::Raw => "raw",
            CidCodec::DagCbor => "dag-cbor",
        }
    }
}

/// Create a CID from data using a BLAKE3-256 multihash
pub fn create_cid(data: &[u8], codec: CidCodec) -> Cid {
    let multihash = Code::Blake3_256.digest(data);
    Cid::new(Version::V1, codec.code(), multihash).expect("valid CID construction")
}

/// Create a CID around a precomputed BLAKE3 digest
pub fn cid_from_digest(digest: &[u8; DIGEST_LEN], codec: CidCodec) -> Cid {
    let multihash =
        Multihash::<64>::wrap(BLAKE3_MULTIHASH_CODE, digest).expect("32-byte digest fits a multihash");
    Cid::new(Version::V1, codec.code(), multihash).expect("valid CID construction")
}

/// Extract the BLAKE3 digest carried by a CID
///
/// Returns `None` for CIDs built with any other hash function.
pub fn digest_of(cid: &Cid) -> Option<[u8; DIGEST_LEN]> {
    let multihash = cid.hash();
    if multihash.code() != BLAKE3_MULTIHASH_CODE {
        return None;
    }
    multihash.digest().try_into().ok()
}

/// Verify that data matches a CID
pub fn verify_cid(data: &[u8], cid: &Cid) -> bool {
    let expected = create_cid(data, CidCodec::from_code(cid.codec()).unwrap_or_default());
    expected == *cid
}

/// Parse a CID from a string
pub fn parse_cid(s: &str) -> Result<Cid, crate::BlockStoreError> {
    s.parse()
        .map_err(|e: cid::Error| crate::BlockStoreError::InvalidCid(e.to_string()))
}
