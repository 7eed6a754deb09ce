//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::ledger::CorruptSnapshotPolicy;

#[derive(Debug, Parser)]
#[command(
    name = "identity-ledger",
    version,
    about = "Tamper-evident ledger of identity commitments"
)]
pub struct Args {
    /// Directory holding the ledger snapshot.
    #[arg(long, env = "IDENTITY_LEDGER_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Snapshot file name inside the data directory.
    #[arg(long, env = "IDENTITY_LEDGER_SNAPSHOT_FILE", default_value = "blockchain.json")]
    pub snapshot_file: String,

    /// What to do when the snapshot exists but cannot be parsed.
    #[arg(
        long,
        env = "IDENTITY_LEDGER_ON_CORRUPT",
        value_enum,
        default_value_t = OnCorrupt::Regenesis
    )]
    pub on_corrupt: OnCorrupt,

    #[arg(
        long,
        env = "IDENTITY_LEDGER_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "IDENTITY_LEDGER_LISTEN", default_value = "127.0.0.1:3000")]
        listen: SocketAddr,
    },
    /// Interactive console.
    Console,
    /// Check chain integrity; exits non-zero when the chain is broken.
    Verify,
    /// Re-link every block hash (does not restore tampered data).
    Repair,
    /// Print every block.
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnCorrupt {
    /// Keep a backup, log loudly, start a new chain.
    Regenesis,
    /// Refuse to start.
    Fail,
}

impl From<OnCorrupt> for CorruptSnapshotPolicy {
    fn from(v: OnCorrupt) -> Self {
        match v {
            OnCorrupt::Regenesis => CorruptSnapshotPolicy::Regenesis,
            OnCorrupt::Fail => CorruptSnapshotPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
