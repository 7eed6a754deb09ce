use thiserror::Error;

use crate::digest::DigestError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("digest error: {0}")]
    Digest(#[from] DigestError),
    #[error("identity {0} is already registered")]
    DuplicateEntry(String),
    #[error("ledger has no blocks")]
    EmptyLedger,
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
    #[error("snapshot {location} is unreadable: {reason}")]
    CorruptSnapshot { location: String, reason: String },
    #[error("clock error: {0}")]
    Timestamp(#[from] time::error::Format),
}
