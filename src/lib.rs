//! Append-only, tamper-evident ledger of identity-hash commitments.
//!
//! Each accepted identity is recorded as a block linked to its predecessor by
//! SHA-256, so later edits to the stored chain can be detected and located.

pub mod canonical;
pub mod config;
pub mod console;
pub mod digest;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod routes;
pub mod storage;

use std::sync::{Arc, Mutex};

pub use error::LedgerError;
pub use ledger::{BreakReason, ChainStatus, CorruptSnapshotPolicy, Ledger, RepairReport};
pub use model::Block;
pub use storage::{FileSnapshotStore, LoadedSnapshot, MemorySnapshotStore, SnapshotStore};

/// Shared application state passed to Axum handlers. The one mutex covers
/// every read, mutation and snapshot write of the ledger.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }
}
