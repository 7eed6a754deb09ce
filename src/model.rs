//! Data model for identity commitments and their hash-linked blocks.

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::canonical::to_canonical_vec;
use crate::digest::{digest, DigestError};

/// Index of the genesis block. Indices are 1-based.
pub const GENESIS_INDEX: u64 = 1;
/// Payload carried by the genesis block.
pub const GENESIS_DATA: &str = "Genesis Block";
/// `previous_hash` sentinel of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 1-indexed position in the chain.
    pub index: u64,
    /// Creation time. Informational, but part of the hashed content.
    pub timestamp: String,
    /// SHA-256 hex of the committed identity (or the genesis marker).
    pub data: String,
    /// Hash of the preceding block, `"0"` for genesis.
    pub previous_hash: String,
    /// SHA-256 hex of the canonical form of this block.
    pub hash: String,
}

/// Hashed view of a block: fields in sorted key order, `hash` always null.
#[derive(Serialize)]
struct CanonicalBlock<'a> {
    data: &'a str,
    hash: (),
    index: u64,
    previous_hash: &'a str,
    timestamp: &'a str,
}

impl Block {
    /// Build a block and compute its hash.
    pub fn new(
        index: u64,
        timestamp: String,
        data: String,
        previous_hash: String,
    ) -> Result<Self, DigestError> {
        let mut block = Block {
            index,
            timestamp,
            data,
            previous_hash,
            hash: String::new(),
        };
        block.hash = compute_block_hash(&block)?;
        Ok(block)
    }

    pub fn genesis(timestamp: String) -> Result<Self, DigestError> {
        Self::new(
            GENESIS_INDEX,
            timestamp,
            GENESIS_DATA.to_string(),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.index == GENESIS_INDEX
    }
}

/// Canonical bytes of a block with its `hash` field cleared.
pub fn canonicalize(b: &Block) -> Result<Vec<u8>, DigestError> {
    let view = CanonicalBlock {
        data: &b.data,
        hash: (),
        index: b.index,
        previous_hash: &b.previous_hash,
        timestamp: &b.timestamp,
    };
    Ok(to_canonical_vec(&view)?)
}

/// Compute a block hash from its canonical form. The stored `hash` is ignored.
pub fn compute_block_hash(b: &Block) -> Result<String, DigestError> {
    Ok(digest(&canonicalize(b)?))
}

/// Current time as an RFC 3339 string.
pub fn now_timestamp() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "2025-01-15 10:30:00.123456";
    const GENESIS_HASH: &str = "0869b9861e4484b9f9f025bec8f7588522d378397b882eb5a4032f801b9390f2";

    #[test]
    fn canonical_form_sorts_keys_and_nulls_hash() {
        let g = Block::genesis(TS.to_string()).unwrap();
        let canon = String::from_utf8(canonicalize(&g).unwrap()).unwrap();
        assert_eq!(
            canon,
            r#"{"data": "Genesis Block", "hash": null, "index": 1, "previous_hash": "0", "timestamp": "2025-01-15 10:30:00.123456"}"#
        );
    }

    #[test]
    fn hashes_match_existing_ledger_files() {
        let g = Block::genesis(TS.to_string()).unwrap();
        assert_eq!(g.hash, GENESIS_HASH);

        let id_hash = digest(b"123456789012");
        assert_eq!(
            id_hash,
            "2a33349e7e606a8ad2e30e3c84521f9377450cf09083e162e0a9b1480ce0f972"
        );
        let b = Block::new(2, "2025-01-15T10:31:00Z".into(), id_hash, g.hash.clone()).unwrap();
        assert_eq!(
            b.hash,
            "bf5345d08733b970d18e1da34a565b23b465073cf391e8856cefdf28704af731"
        );
    }

    #[test]
    fn stored_hash_does_not_feed_its_own_digest() {
        let mut g = Block::genesis(TS.to_string()).unwrap();
        g.hash = "garbage".into();
        assert_eq!(compute_block_hash(&g).unwrap(), GENESIS_HASH);
    }

    #[test]
    fn snapshot_field_names() {
        let g = Block::genesis(TS.to_string()).unwrap();
        let v = serde_json::to_value(&g).unwrap();
        for key in ["index", "timestamp", "data", "previous_hash", "hash"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn now_timestamp_is_rfc3339() {
        let ts = now_timestamp().unwrap();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}
