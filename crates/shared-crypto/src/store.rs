//! Directory of sealed JSON records

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::key::StorageKey;
use crate::seal::{open, seal, SealedEnvelope};
use crate::StoreError;

const KEY_FILE: &str = "storage.key";

/// Encrypted key/value store backed by one file per record
#[derive(Debug, Clone)]
pub struct SealedStore {
    dir: PathBuf,
    key: StorageKey,
}

impl SealedStore {
    /// Open the store in `dir`, creating the directory and key as needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let key = StorageKey::load_or_create(&dir.join(KEY_FILE))?;
        Ok(Self { dir, key })
    }

    /// Store with an explicit key (tests, or keys held elsewhere)
    pub fn with_key(dir: impl Into<PathBuf>, key: StorageKey) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, key })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StoreError::InvalidRecordName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.sealed", name)))
    }

    /// Read and decrypt a record; `Ok(None)` when it was never written
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.record_path(name)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: SealedEnvelope = serde_json::from_slice(&raw)?;
        let plaintext = open(&self.key, name, &envelope)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    /// Encrypt and write a record, replacing any previous value
    pub fn put<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.record_path(name)?;
        let plaintext = serde_json::to_vec(value)?;
        let envelope = seal(&self.key, name, &plaintext)?;

        // Write beside the target, then rename so readers never see half a record.
        let tmp = path.with_extension("sealed.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&envelope)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Delete a record; deleting a missing record is not an error
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.record_path(name)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SealError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        token: String,
    }

    #[test]
    fn test_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SealedStore::open(dir.path()).unwrap();

        assert_eq!(store.get::<Session>("session").unwrap(), None);

        let session = Session {
            token: "abc".into(),
        };
        store.put("session", &session).unwrap();
        assert_eq!(store.get::<Session>("session").unwrap(), Some(session));

        store.remove("session").unwrap();
        store.remove("session").unwrap();
        assert_eq!(store.get::<Session>("session").unwrap(), None);
    }

    #[test]
    fn test_file_on_disk_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = SealedStore::open(dir.path()).unwrap();
        store
            .put(
                "session",
                &Session {
                    token: "very-secret-token".into(),
                },
            )
            .unwrap();
        let raw = fs::read_to_string(dir.path().join("session.sealed")).unwrap();
        assert!(!raw.contains("very-secret-token"));
    }

    #[test]
    fn test_reopen_reads_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        SealedStore::open(dir.path())
            .unwrap()
            .put("session", &Session { token: "t".into() })
            .unwrap();
        let reopened = SealedStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get::<Session>("session").unwrap(),
            Some(Session { token: "t".into() })
        );
    }

    #[test]
    fn test_foreign_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        SealedStore::with_key(dir.path(), StorageKey::generate())
            .unwrap()
            .put("session", &Session { token: "t".into() })
            .unwrap();
        let other = SealedStore::with_key(dir.path(), StorageKey::generate()).unwrap();
        assert!(matches!(
            other.get::<Session>("session"),
            Err(StoreError::Seal(SealError::KeyMismatch))
        ));
    }

    #[test]
    fn test_record_names_cannot_escape_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SealedStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("../evil", &1u8),
            Err(StoreError::InvalidRecordName(_))
        ));
    }
}
