//! SHA-256 digest helpers shared by block hashing and identity commitments.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("input is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("failed to canonicalize block: {0}")]
    Canonical(#[from] serde_json::Error),
}

/// Hash bytes with SHA-256 and return lowercase hex.
pub fn digest(bytes: &[u8]) -> String {
    hash_concat(&[bytes])
}

/// Hash inputs (concatenated as bytes) and return lowercase hex.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Digest of text that arrived as raw bytes. Refuses input that is not UTF-8
/// instead of hashing a lossy replacement.
pub fn digest_text(bytes: &[u8]) -> Result<String, DigestError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_known_digest() {
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn known_vector_abc() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn concat_matches_single_buffer() {
        assert_eq!(hash_concat(&[b"ab", b"c"]), digest(b"abc"));
    }

    #[test]
    fn digest_text_rejects_invalid_utf8() {
        let err = digest_text(&[0x66, 0xff, 0x6f]).unwrap_err();
        assert!(matches!(err, DigestError::Encoding(_)));
        assert_eq!(digest_text(b"123456789012").unwrap(), digest(b"123456789012"));
    }
}
