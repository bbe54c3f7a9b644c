//! Authenticated encryption of small records
//!
//! Records are sealed with ChaCha20-Poly1305. The record name is bound as
//! associated data so a sealed file cannot be swapped for another record.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

use crate::key::StorageKey;
use crate::SealError;

/// Current envelope version
pub const ENVELOPE_VERSION: u32 = 1;

const NONCE_LEN: usize = 12;

/// On-disk form of a sealed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub v: u32,
    /// Fingerprint of the key that sealed the record
    pub kid: String,
    pub nonce: String,
    pub ct: String,
}

/// Encrypt `plaintext` for the record called `name`
pub fn seal(key: &StorageKey, name: &str, plaintext: &[u8]) -> Result<SealedEnvelope, SealError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: name.as_bytes(),
            },
        )
        .map_err(|_| SealError::Encrypt)?;

    Ok(SealedEnvelope {
        v: ENVELOPE_VERSION,
        kid: key.fingerprint(),
        nonce: BASE64.encode(nonce),
        ct: BASE64.encode(ciphertext),
    })
}

/// Decrypt an envelope sealed for the record called `name`
pub fn open(key: &StorageKey, name: &str, envelope: &SealedEnvelope) -> Result<Vec<u8>, SealError> {
    if envelope.v != ENVELOPE_VERSION {
        return Err(SealError::UnsupportedVersion(envelope.v));
    }
    if envelope.kid != key.fingerprint() {
        return Err(SealError::KeyMismatch);
    }

    let nonce = BASE64
        .decode(&envelope.nonce)
        .map_err(|e| SealError::Malformed(format!("nonce: {}", e)))?;
    if nonce.len() != NONCE_LEN {
        return Err(SealError::Malformed(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }
    let ciphertext = BASE64
        .decode(&envelope.ct)
        .map_err(|e| SealError::Malformed(format!("ciphertext: {}", e)))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: name.as_bytes(),
            },
        )
        .map_err(|_| SealError::Tampered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let key = StorageKey::generate();
        let envelope = seal(&key, "session", b"token-123").unwrap();
        assert_eq!(envelope.v, ENVELOPE_VERSION);
        assert_eq!(open(&key, "session", &envelope).unwrap(), b"token-123");
    }

    #[test]
    fn test_ciphertext_hides_plaintext() {
        let key = StorageKey::generate();
        let envelope = seal(&key, "session", b"bearer-secret").unwrap();
        let raw = BASE64.decode(&envelope.ct).unwrap();
        assert!(!raw.windows(13).any(|w| w == b"bearer-secret"));
    }

    #[test]
    fn test_wrong_key_reports_mismatch() {
        let envelope = seal(&StorageKey::generate(), "session", b"x").unwrap();
        assert_eq!(
            open(&StorageKey::generate(), "session", &envelope),
            Err(SealError::KeyMismatch)
        );
    }

    #[test]
    fn test_record_name_is_bound() {
        let key = StorageKey::generate();
        let envelope = seal(&key, "session", b"x").unwrap();
        assert_eq!(open(&key, "context", &envelope), Err(SealError::Tampered));
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let key = StorageKey::generate();
        let mut envelope = seal(&key, "session", b"token").unwrap();
        let mut raw = BASE64.decode(&envelope.ct).unwrap();
        raw[0] ^= 0x01;
        envelope.ct = BASE64.encode(raw);
        assert_eq!(open(&key, "session", &envelope), Err(SealError::Tampered));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let key = StorageKey::generate();
        let mut envelope = seal(&key, "session", b"token").unwrap();
        envelope.v = 9;
        assert_eq!(
            open(&key, "session", &envelope),
            Err(SealError::UnsupportedVersion(9))
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: any payload opens to exactly what was sealed
        #[test]
        fn sealed_payload_opens_unchanged(
            name in "[a-z]{1,12}",
            payload in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let key = StorageKey::generate();
            let envelope = seal(&key, &name, &payload).unwrap();
            prop_assert_eq!(open(&key, &name, &envelope).unwrap(), payload);
        }
    }
}
