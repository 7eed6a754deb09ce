//! Interactive console driver over a ledger.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::error::LedgerError;
use crate::identity::commitment;
use crate::ledger::{ChainStatus, Ledger, RepairReport};

const MENU: &str = "
========================================
   Identity Verification System Menu
========================================
1. Register New Identity
2. Verify Identity
3. Check Blockchain Integrity
4. Print Entire Blockchain
5. Repair Blockchain (admin)
6. Exit
========================================";

/// Run the menu loop until the user exits or input ends.
pub fn run<R: BufRead, W: Write>(
    ledger: &mut Ledger,
    mut input: R,
    mut out: W,
) -> io::Result<()> {
    writeln!(out, "Ledger ready with {} block(s).", ledger.len())?;
    loop {
        writeln!(out, "{MENU}")?;
        let Some(choice) = prompt(&mut input, &mut out, "Enter your choice (1-6): ")? else {
            break;
        };
        let choice = String::from_utf8_lossy(&choice);
        debug!(choice = %choice, "console command");
        match choice.as_ref() {
            "1" => {
                let msg = "Enter the 12-digit identity number to register: ";
                let Some(id) = prompt(&mut input, &mut out, msg)? else {
                    break;
                };
                register(ledger, &id, &mut out)?;
            }
            "2" => {
                let msg = "Enter the 12-digit identity number to verify: ";
                let Some(id) = prompt(&mut input, &mut out, msg)? else {
                    break;
                };
                verify(ledger, &id, &mut out)?;
            }
            "3" => print_status(&ledger.is_chain_valid(), &mut out)?,
            "4" => print_chain(ledger, &mut out)?,
            "5" => match ledger.repair_chain() {
                Ok(report) => print_repair(&report, &mut out)?,
                Err(e) => writeln!(out, "\nError: repair failed: {e}")?,
            },
            "6" => {
                writeln!(out, "Exiting. Goodbye.")?;
                break;
            }
            _ => writeln!(out, "Invalid choice. Please enter a number between 1 and 6.")?,
        }
    }
    Ok(())
}

/// Read one line as raw bytes, trimmed. Input is not assumed to be UTF-8.
fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    msg: &str,
) -> io::Result<Option<Vec<u8>>> {
    write!(out, "{msg}")?;
    out.flush()?;
    let mut line = Vec::new();
    if input.read_until(b'\n', &mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_ascii().to_vec()))
}

fn register<W: Write>(ledger: &mut Ledger, id_number: &[u8], out: &mut W) -> io::Result<()> {
    if let ChainStatus::Invalid { index, .. } = ledger.is_chain_valid() {
        return writeln!(
            out,
            "\nRefused: ledger compromised at block #{index}. Repair it before registering."
        );
    }
    let hash = match commitment(id_number) {
        Ok(h) => h,
        Err(e) => return writeln!(out, "\nError: {e}."),
    };
    writeln!(out, "Hashed ID: {hash}")?;
    match ledger.append(&hash) {
        Ok(block) => writeln!(
            out,
            "\nSuccess: Block #{} (Identity: {}...) added to the chain.",
            block.index,
            &hash[..10]
        ),
        Err(LedgerError::DuplicateEntry(_)) => {
            writeln!(out, "\nError: This identity is already registered.")
        }
        Err(e) => writeln!(out, "\nError adding block: {e}"),
    }
}

fn verify<W: Write>(ledger: &Ledger, id_number: &[u8], out: &mut W) -> io::Result<()> {
    let hash = match commitment(id_number) {
        Ok(h) => h,
        Err(e) => return writeln!(out, "\nError: {e}."),
    };
    writeln!(out, "Checking for hash: {hash}")?;
    if ledger.verify_identity(&hash) {
        writeln!(
            out,
            "\n*** VERIFICATION SUCCESSFUL ***\nThis identity is registered on the ledger."
        )
    } else {
        writeln!(out, "\n*** VERIFICATION FAILED ***\nThis identity was not found.")
    }
}

pub fn print_status<W: Write>(status: &ChainStatus, out: &mut W) -> io::Result<()> {
    match status {
        ChainStatus::Valid => writeln!(
            out,
            "\nIntegrity check: PASS. All blocks are linked and unmodified."
        ),
        ChainStatus::Invalid { index, reason } => {
            writeln!(out, "\nIntegrity check: FAILED at block #{index}: {reason}.")
        }
    }
}

pub fn print_chain<W: Write>(ledger: &Ledger, out: &mut W) -> io::Result<()> {
    for block in ledger.blocks() {
        writeln!(out, "\nBlock {} {}", block.index, "-".repeat(30))?;
        writeln!(out, "  Timestamp:     {}", block.timestamp)?;
        writeln!(out, "  Data:          {}", block.data)?;
        writeln!(out, "  Previous Hash: {}", block.previous_hash)?;
        writeln!(out, "  Hash:          {}", block.hash)?;
    }
    Ok(())
}

pub fn print_repair<W: Write>(report: &RepairReport, out: &mut W) -> io::Result<()> {
    match report.previously_tampered_index {
        Some(index) => writeln!(out, "\nChain was broken at block #{index}.")?,
        None => writeln!(out, "\nChain was already structurally valid.")?,
    }
    writeln!(
        out,
        "Re-linked {} of {} block(s).\nWARNING: {}.",
        report.relinked.len(),
        report.blocks,
        report.warning
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ledger::CorruptSnapshotPolicy;
    use crate::storage::MemorySnapshotStore;

    fn session(ledger: &mut Ledger, script: &str) -> String {
        session_bytes(ledger, script.as_bytes())
    }

    fn session_bytes(ledger: &mut Ledger, script: &[u8]) -> String {
        let mut out = Vec::new();
        run(ledger, script, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::initialize(
            Arc::new(MemorySnapshotStore::default()),
            CorruptSnapshotPolicy::Regenesis,
        )
        .unwrap()
    }

    #[test]
    fn register_verify_and_duplicate() {
        let mut l = ledger();
        let out = session(
            &mut l,
            "1\n123456789012\n1\n123456789012\n2\n123456789012\n2\n000000000000\n6\n",
        );
        assert!(out.contains("Success: Block #2"));
        assert!(out.contains("already registered"));
        assert!(out.contains("VERIFICATION SUCCESSFUL"));
        assert!(out.contains("VERIFICATION FAILED"));
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn invalid_input_is_reported() {
        let mut l = ledger();
        let out = session(&mut l, "1\n12ab\n9\n6\n");
        assert!(out.contains("exactly 12 digits"));
        assert!(out.contains("Invalid choice"));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn tamper_refuses_registration_then_repair() {
        let mut l = ledger();
        session(&mut l, "1\n123456789012\n6\n");
        l.blocks_mut()[1].data = "forged".into();

        let out = session(&mut l, "3\n1\n222233334444\n5\n3\n");
        assert!(out.contains("FAILED at block #2"));
        assert!(out.contains("Refused"));
        assert!(out.contains("WARNING"));
        assert!(out.contains("PASS"));
        assert_eq!(l.len(), 2);
        assert_eq!(l.blocks()[1].data, "forged");
    }

    #[test]
    fn non_utf8_identity_is_reported_not_fatal() {
        let mut l = ledger();
        let out = session_bytes(&mut l, b"1\n12345\xff7890123\n2\n\xfe\n4\n6\n");
        assert!(out.contains("not valid UTF-8"));
        assert!(out.contains("Genesis Block"));
        assert!(out.contains("Goodbye"));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn eof_ends_session() {
        let mut l = ledger();
        let out = session(&mut l, "4\n");
        assert!(out.contains("Genesis Block"));
    }
}
