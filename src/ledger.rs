//! The ledger engine: an ordered, hash-linked sequence of identity commitments.
//!
//! A `Ledger` exclusively owns its blocks and writes a full snapshot through its
//! [`SnapshotStore`] after every structural change. It is not internally
//! synchronized; shared callers wrap it in a single mutex so that
//! read/mutate/persist happens as one unit.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::LedgerError;
use crate::model::{
    compute_block_hash, now_timestamp, Block, GENESIS_INDEX, GENESIS_PREVIOUS_HASH,
};
use crate::storage::{LoadedSnapshot, SnapshotStore};

/// Lowest index that carries an identity commitment. The genesis block holds a
/// marker, so duplicate scans and lookups never look at it.
pub const FIRST_ENTRY_INDEX: u64 = GENESIS_INDEX + 1;

/// What `initialize` does with a snapshot that exists but cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptSnapshotPolicy {
    /// Log it, keep a backup where the store supports it, start a new chain.
    #[default]
    Regenesis,
    /// Refuse to start.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` differs from the prior block's stored hash.
    LinkMismatch,
    /// Stored index differs from the block's position.
    IndexMismatch,
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakReason::HashMismatch => "stored hash does not match block contents",
            BreakReason::LinkMismatch => "previous_hash does not match the prior block",
            BreakReason::IndexMismatch => "index does not match position in the chain",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Valid,
    /// First broken block. Nothing after it is trustworthy.
    Invalid { index: u64, reason: BreakReason },
}

impl ChainStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainStatus::Valid)
    }

    pub fn tampered_index(&self) -> Option<u64> {
        match self {
            ChainStatus::Valid => None,
            ChainStatus::Invalid { index, .. } => Some(*index),
        }
    }

    pub fn reason(&self) -> Option<BreakReason> {
        match self {
            ChainStatus::Valid => None,
            ChainStatus::Invalid { reason, .. } => Some(*reason),
        }
    }
}

/// Result of `repair_chain`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub blocks: usize,
    /// Indices whose stored index, link or hash was rewritten.
    pub relinked: Vec<u64>,
    /// Where the chain was broken before the repair, if it was.
    pub previously_tampered_index: Option<u64>,
    /// Always false: repair re-links hashes, it does not vouch for `data`.
    pub content_verified: bool,
    pub warning: &'static str,
}

impl RepairReport {
    pub const CONTENT_WARNING: &'static str = "hash links were recomputed over the current block \
        contents; any altered data is now accepted as-is and must be checked out of band";
}

pub struct Ledger {
    blocks: Vec<Block>,
    store: Arc<dyn SnapshotStore>,
}

impl Ledger {
    /// Load the stored chain verbatim, or start a new one with a genesis block.
    /// Loaded chains are not validated here; call [`Ledger::is_chain_valid`].
    pub fn initialize(
        store: Arc<dyn SnapshotStore>,
        policy: CorruptSnapshotPolicy,
    ) -> Result<Self, LedgerError> {
        let location = store.describe();
        let loaded = match store.load() {
            Ok(loaded) => loaded,
            Err(e) if policy == CorruptSnapshotPolicy::Fail => return Err(e.into()),
            Err(e) => {
                warn!(
                    location = %location,
                    error = %e,
                    "unreadable snapshot will be OVERWRITTEN by a new genesis chain, no backup"
                );
                LoadedSnapshot::Corrupt {
                    reason: e.to_string(),
                }
            }
        };

        match loaded {
            LoadedSnapshot::Blocks(blocks) if !blocks.is_empty() => {
                info!(location = %location, blocks = blocks.len(), "ledger loaded");
                Ok(Self { blocks, store })
            }
            LoadedSnapshot::Blocks(_) => {
                info!(location = %location, "snapshot is empty; creating genesis block");
                Self::with_genesis(store)
            }
            LoadedSnapshot::Absent => {
                info!(location = %location, "no snapshot found; creating genesis block");
                Self::with_genesis(store)
            }
            LoadedSnapshot::Corrupt { reason } => match policy {
                CorruptSnapshotPolicy::Fail => {
                    Err(LedgerError::CorruptSnapshot { location, reason })
                }
                CorruptSnapshotPolicy::Regenesis => {
                    warn!(
                        location = %location,
                        reason = %reason,
                        "DISCARDING unreadable snapshot; previous ledger contents are not loaded"
                    );
                    Self::with_genesis(store)
                }
            },
        }
    }

    fn with_genesis(store: Arc<dyn SnapshotStore>) -> Result<Self, LedgerError> {
        let genesis = Block::genesis(now_timestamp()?)?;
        store.save(std::slice::from_ref(&genesis))?;
        info!(hash = %genesis.hash, "genesis block created");
        Ok(Self {
            blocks: vec![genesis],
            store,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_last_block(&self) -> Result<&Block, LedgerError> {
        self.blocks.last().ok_or(LedgerError::EmptyLedger)
    }

    /// Blocks at [`FIRST_ENTRY_INDEX`] and above, by position.
    fn entries(&self) -> impl Iterator<Item = &Block> {
        (GENESIS_INDEX..)
            .zip(&self.blocks)
            .filter(|(index, _)| *index >= FIRST_ENTRY_INDEX)
            .map(|(_, block)| block)
    }

    /// True if `digest` is committed by any block past genesis.
    pub fn verify_identity(&self, digest: &str) -> bool {
        self.entries().any(|b| b.data == digest)
    }

    /// Append a commitment. The block is kept only if the snapshot save
    /// succeeds; on failure the chain is left as it was.
    pub fn append(&mut self, payload_digest: &str) -> Result<Block, LedgerError> {
        if self.verify_identity(payload_digest) {
            return Err(LedgerError::DuplicateEntry(payload_digest.to_string()));
        }
        let prev_hash = self.get_last_block()?.hash.clone();
        let block = Block::new(
            self.blocks.len() as u64 + 1,
            now_timestamp()?,
            payload_digest.to_string(),
            prev_hash,
        )?;

        self.blocks.push(block.clone());
        if let Err(e) = self.store.save(&self.blocks) {
            self.blocks.pop();
            error!(index = block.index, error = %e, "append not persisted; rolled back");
            return Err(e.into());
        }
        info!(index = block.index, hash = %block.hash, "block appended");
        Ok(block)
    }

    /// Walk the chain from genesis and report the first broken block.
    pub fn is_chain_valid(&self) -> ChainStatus {
        let mut prev: Option<&Block> = None;
        for (index, block) in (GENESIS_INDEX..).zip(&self.blocks) {
            if let Some(reason) = check_block(index, block, prev) {
                warn!(index, %reason, "chain integrity check failed");
                return ChainStatus::Invalid { index, reason };
            }
            prev = Some(block);
        }
        ChainStatus::Valid
    }

    /// Rebuild every link and hash from genesis forward, keeping `data` and
    /// `timestamp`. This restores structural validity only: tampered payloads
    /// survive the repair and become part of the valid chain.
    pub fn repair_chain(&mut self) -> Result<RepairReport, LedgerError> {
        let before = self.is_chain_valid();

        let mut rebuilt = Vec::with_capacity(self.blocks.len());
        let mut relinked = Vec::new();
        let mut prev_hash = GENESIS_PREVIOUS_HASH.to_string();
        for (index, block) in (GENESIS_INDEX..).zip(&self.blocks) {
            let fresh = Block::new(index, block.timestamp.clone(), block.data.clone(), prev_hash)?;
            if fresh != *block {
                relinked.push(index);
            }
            prev_hash = fresh.hash.clone();
            rebuilt.push(fresh);
        }

        if let Err(e) = self.store.save(&rebuilt) {
            error!(error = %e, "repaired chain not persisted; keeping previous blocks");
            return Err(e.into());
        }
        self.blocks = rebuilt;

        warn!(
            relinked = relinked.len(),
            previously_tampered_index = ?before.tampered_index(),
            "chain re-linked; block contents were NOT verified"
        );
        Ok(RepairReport {
            blocks: self.blocks.len(),
            relinked,
            previously_tampered_index: before.tampered_index(),
            content_verified: false,
            warning: RepairReport::CONTENT_WARNING,
        })
    }

    /// Write the current chain to the store.
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.store.save(&self.blocks)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

fn check_block(position: u64, block: &Block, prev: Option<&Block>) -> Option<BreakReason> {
    match compute_block_hash(block) {
        Ok(hash) if hash == block.hash => {}
        _ => return Some(BreakReason::HashMismatch),
    }
    if block.index != position {
        return Some(BreakReason::IndexMismatch);
    }
    match prev {
        Some(prev) if block.previous_hash != prev.hash => Some(BreakReason::LinkMismatch),
        _ => None,
    }
}
