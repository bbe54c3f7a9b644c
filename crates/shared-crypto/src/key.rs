//! Storage key management
//!
//! One random 256-bit key per installation, kept as hex in a key file that
//! only the owner can read.

use chacha20poly1305::aead::{KeyInit, OsRng};
use chacha20poly1305::ChaCha20Poly1305;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

use crate::StoreError;

/// Length of the hex fingerprint written into sealed envelopes
const FINGERPRINT_LEN: usize = 16;

/// Symmetric key used to seal client state
#[derive(Clone)]
pub struct StorageKey([u8; 32]);

impl StorageKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(key.as_slice());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short SHA-256 fingerprint identifying this key without revealing it
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        hex
    }

    /// Load the key at `path`, creating it on first use
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_hex(contents.trim()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let key = Self::generate();
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, hex::encode(key.0))?;
                restrict_permissions(path)?;
                tracing::debug!(path = %path.display(), "created storage key");
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn from_hex(hex_str: &str) -> Result<Self, StoreError> {
        let bytes = hex::decode(hex_str).map_err(|_| StoreError::InvalidKeyFile)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| StoreError::InvalidKeyFile)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StorageKey").field(&self.fingerprint()).finish()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = StorageKey::generate();
        let b = StorageKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_load_or_create_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.key");

        let first = StorageKey::load_or_create(&path).unwrap();
        let second = StorageKey::load_or_create(&path).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.key");
        StorageKey::load_or_create(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_key_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.key");
        fs::write(&path, "not-hex").unwrap();
        assert!(matches!(
            StorageKey::load_or_create(&path),
            Err(StoreError::InvalidKeyFile)
        ));
    }
}
