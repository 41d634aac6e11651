//! Token persistence backends.
//!
//! The session store keeps one opaque token under [`TOKEN_KEY`]. Any
//! backend that survives a process restart can stand in for the browser's
//! local storage: a JSON file in the cache directory, the OS keychain, or
//! a process-local map for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyring::Entry;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Well-known key holding the session token
pub const TOKEN_KEY: &str = "auth_token";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name for stored tokens
const SERVICE_NAME: &str = "academy";

const DURABILITY_CHECK_KEY: &str = "durability_check";
const DURABILITY_CHECK_VALUE: &str = "ok";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Token storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token storage file is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Key-value persistence for opaque tokens.
///
/// Reads have no side effects. Removing a key that is not present succeeds.
pub trait TokenStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, token: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store. Clones share the same map, so a clone handed to a
/// second session store behaves like storage surviving a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, token: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Tokens kept as a JSON object in `<cache_dir>/session.json`.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: cache_dir.join(SESSION_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, token: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.load().unwrap_or_else(|e| {
            debug!(error = %e, "Discarding unreadable session file");
            BTreeMap::new()
        });
        entries.insert(key.to_string(), token.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        match self.load() {
            Ok(mut entries) => {
                if entries.remove(key).is_some() {
                    self.save(&entries)?;
                }
                Ok(())
            }
            Err(StorageError::Serialization(e)) => {
                // Nothing trustworthy left in a corrupt file
                debug!(error = %e, "Removing corrupt session file");
                std::fs::remove_file(&self.path)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// OS keychain store
// ============================================================================

/// Tokens kept in the OS keychain, one entry per key.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }

    /// Whether a value written through one entry handle can be read back
    /// through a fresh one. Without a native keystore, keyring hands out
    /// isolated mock credentials and nothing written here would persist.
    pub fn is_durable(&self) -> bool {
        let written = self
            .entry(DURABILITY_CHECK_KEY)
            .and_then(|entry| Ok(entry.set_password(DURABILITY_CHECK_VALUE)?));
        if let Err(e) = written {
            debug!(error = %e, "Keychain rejected a write");
            return false;
        }

        let durable = matches!(
            self.read(DURABILITY_CHECK_KEY),
            Ok(Some(ref value)) if value == DURABILITY_CHECK_VALUE
        );
        if let Err(e) = self.remove(DURABILITY_CHECK_KEY) {
            debug!(error = %e, "Failed to remove keychain check entry");
        }
        durable
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, token: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(token)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_clones_share_entries() {
        let store = MemoryTokenStore::new();
        let restarted = store.clone();

        store.write(TOKEN_KEY, "abc").unwrap();
        assert_eq!(restarted.read(TOKEN_KEY).unwrap().as_deref(), Some("abc"));

        restarted.remove(TOKEN_KEY).unwrap();
        assert_eq!(store.read(TOKEN_KEY).unwrap(), None);
        // Removing again is fine
        store.remove(TOKEN_KEY).unwrap();
    }

    #[test]
    fn test_file_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));
        assert_eq!(store.read(TOKEN_KEY).unwrap(), None);

        store.write(TOKEN_KEY, "persisted-token").unwrap();
        assert!(store.path().exists());

        let reopened = FileTokenStore::new(dir.path().join("nested"));
        assert_eq!(reopened.read(TOKEN_KEY).unwrap().as_deref(), Some("persisted-token"));
    }

    #[test]
    fn test_file_store_remove_last_key_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());

        store.write(TOKEN_KEY, "t1").unwrap();
        store.write("refresh_token", "t2").unwrap();
        store.remove(TOKEN_KEY).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.read("refresh_token").unwrap().as_deref(), Some("t2"));

        store.remove("refresh_token").unwrap();
        assert!(!store.path().exists());
        store.remove("refresh_token").unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.read(TOKEN_KEY), Err(StorageError::Serialization(_))));
        store.remove(TOKEN_KEY).unwrap();
        assert!(!store.path().exists());

        std::fs::write(store.path(), "garbage").unwrap();
        store.write(TOKEN_KEY, "fresh").unwrap();
        assert_eq!(store.read(TOKEN_KEY).unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_keyring_store_absent_entry() {
        let store = KeyringTokenStore::with_service("academy-test-absent");
        assert_eq!(store.read("never-written").unwrap(), None);
        store.remove("never-written").unwrap();
    }

    #[test]
    fn test_keyring_store_survives_new_instance() {
        let store = KeyringTokenStore::with_service("academy-test-round-trip");
        if let Err(e) = store.write(TOKEN_KEY, "keychain-token") {
            eprintln!("Skipping: no keychain available ({})", e);
            return;
        }

        let reopened = KeyringTokenStore::with_service("academy-test-round-trip");
        let read_back = reopened.read(TOKEN_KEY);
        reopened.remove(TOKEN_KEY).unwrap();

        assert_eq!(read_back.unwrap().as_deref(), Some("keychain-token"));
        assert_eq!(store.read(TOKEN_KEY).unwrap(), None);
        assert!(store.is_durable());
    }
}
