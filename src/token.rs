//! Persistence of the identity token across connections.
//!
//! The first successful connect yields an [`IdentityToken`]. Every later connect presents it so
//! the server recognizes the same player. A lost token means playing as somebody new.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::network::codec;
use crate::{Identity, IdentityToken, SyncError};

/// What is persisted: who we were and how to prove it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The identity the token belongs to.
    pub identity: Identity,
    /// The token to present on connect.
    pub token: IdentityToken,
}

/// Somewhere to keep [`Credentials`] between connections.
pub trait TokenStore: Send + Sync {
    /// Returns the saved credentials, if any.
    fn load(&self) -> Result<Option<Credentials>, SyncError>;

    /// Replaces the saved credentials.
    fn save(&self, credentials: &Credentials) -> Result<(), SyncError>;

    /// Forgets the saved credentials.
    fn clear(&self) -> Result<(), SyncError>;
}

/// Keeps credentials for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Credentials>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `credentials`.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credentials>, SyncError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), SyncError> {
        *self.slot.lock() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SyncError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// Keeps credentials in a bincode file.
///
/// A missing file means no credentials. The file is written whole on every save.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Uses the file at `path`. Nothing is read or written until the first call.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, action: &str, err: impl std::fmt::Display) -> SyncError {
        SyncError::StorageError {
            context: format!("{} {}: {}", action, self.path.display(), err),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credentials>, SyncError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.storage_error("failed to read", err)),
        };
        codec::decode_value(&bytes)
            .map(Some)
            .map_err(|err| self.storage_error("corrupt credentials in", err))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), SyncError> {
        let bytes =
            codec::encode(credentials).map_err(|err| self.storage_error("failed to encode", err))?;
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.storage_error("failed to create", err))?;
        }
        fs::write(&self.path, bytes).map_err(|err| self.storage_error("failed to write", err))?;
        tracing::debug!(path = %self.path.display(), "saved identity token");
        Ok(())
    }

    fn clear(&self) -> Result<(), SyncError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.storage_error("failed to remove", err)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credentials() -> Credentials {
        Credentials {
            identity: Identity::new("player-7"),
            token: IdentityToken::new("secret-7"),
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&credentials()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credentials()));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_survives_a_new_instance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("token.bin");
        FileTokenStore::new(&path).save(&credentials()).unwrap();
        assert_eq!(
            FileTokenStore::new(&path).load().unwrap(),
            Some(credentials())
        );
    }

    #[test]
    fn missing_file_is_no_credentials() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.bin"));
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.bin");
        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
        let err = FileTokenStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SyncError::StorageError { .. }));
    }

    #[test]
    fn token_debug_is_redacted() {
        let shown = format!("{:?}", credentials());
        assert!(!shown.contains("secret-7"));
        assert!(shown.contains("player-7"));
    }
}
