//! Identity numbers and the commitments recorded for them.

use thiserror::Error;

use crate::digest::{digest_text, DigestError};

pub const ID_NUMBER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity number must be exactly {ID_NUMBER_LEN} digits")]
    Malformed,
    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// Check an identity number (exactly 12 ASCII digits, no separators).
pub fn validate_id_number(id_number: &[u8]) -> Result<(), IdentityError> {
    if id_number.len() == ID_NUMBER_LEN && id_number.iter().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(IdentityError::Malformed)
    }
}

/// Digest committed to the ledger for a raw identity number. Input that is not
/// UTF-8 text is refused as a digest error before the format check runs.
/// The raw number itself is never stored.
pub fn commitment(raw: &[u8]) -> Result<String, IdentityError> {
    let hash = digest_text(raw)?;
    validate_id_number(raw)?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_twelve_digits() {
        assert!(validate_id_number(b"123456789012").is_ok());
    }

    #[test]
    fn rejects_malformed() {
        let bad = [
            "",
            "12345678901",
            "1234567890123",
            "12345678901a",
            "1234 5678 9012",
            "١٢٣٤٥٦٧٨٩٠١٢",
        ];
        for id in bad {
            assert!(
                matches!(commitment(id.as_bytes()), Err(IdentityError::Malformed)),
                "{id:?}"
            );
        }
    }

    #[test]
    fn non_utf8_input_is_a_digest_error() {
        let err = commitment(&[b'1', 0xff, b'2']).unwrap_err();
        assert!(matches!(err, IdentityError::Digest(DigestError::Encoding(_))));
    }

    #[test]
    fn commitment_is_sha256_of_number() {
        assert_eq!(
            commitment(b"123456789012").unwrap(),
            "2a33349e7e606a8ad2e30e3c84521f9377450cf09083e162e0a9b1480ce0f972"
        );
    }
}
