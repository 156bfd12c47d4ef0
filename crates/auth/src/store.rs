//! Persistence for the access/refresh pair and the cached user snapshot

use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::types::{TokenPair, UserProfile};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_DATA_KEY: &str = "user_data";

/// Client-local key-value storage.
///
/// Implementations never fail: an unavailable backend reads as empty and
/// drops writes, which the session layer treats as anonymous.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    /// Writes several entries in one go.
    fn set_all(&self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Removes several entries in one go.
    fn remove_all(&self, keys: &[&str]) {
        for key in keys {
            self.remove(key);
        }
    }
}

/// In-process storage; lost when the client is dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }
}

/// JSON file storage that survives a restart of the client.
///
/// The whole map is rewritten through a temporary file and renamed into
/// place, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileStorage {
    /// Opens (or lazily creates) the storage file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(map) => map,
                Err(err) => {
                    warn!("Ignoring unreadable session file {}: {}", path.display(), err);
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Map<String, Value>) {
        let tmp = self.path.with_extension("tmp");
        let result = serde_json::to_vec_pretty(entries)
            .map_err(std::io::Error::from)
            .and_then(|bytes| {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&tmp, bytes)?;
                fs::rename(&tmp, &self.path)
            });

        if let Err(err) = result {
            warn!("Failed to persist session file {}: {}", self.path.display(), err);
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut entries);
        self.persist(&entries);
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn set(&self, key: &str, value: &str) {
        self.update(|entries| {
            entries.insert(key.to_string(), Value::String(value.to_string()));
        });
    }

    fn remove(&self, key: &str) {
        self.update(|entries| {
            entries.remove(key);
        });
    }

    fn set_all(&self, pairs: &[(&str, &str)]) {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), Value::String(value.to_string()));
            }
        });
    }

    fn remove_all(&self, keys: &[&str]) {
        self.update(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        });
    }
}

/// Owner of the persisted session credentials.
///
/// Both tokens are always written and read under the same lock, so a reader
/// sees either the previous pair or the new one.
pub struct TokenStore {
    storage: Box<dyn SessionStorage>,
    pair_lock: RwLock<()>,
}

impl TokenStore {
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            pair_lock: RwLock::new(()),
        }
    }

    /// Store backed by [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Replaces both tokens.
    pub fn save(&self, access_token: &str, refresh_token: &str) {
        let _guard = self.pair_lock.write().unwrap_or_else(PoisonError::into_inner);
        self.storage.set_all(&[
            (ACCESS_TOKEN_KEY, access_token),
            (REFRESH_TOKEN_KEY, refresh_token),
        ]);
        debug!("Token pair replaced");
    }

    /// Returns the stored pair, or `None` unless both tokens are present.
    pub fn read(&self) -> Option<TokenPair> {
        let _guard = self.pair_lock.read().unwrap_or_else(PoisonError::into_inner);
        let access_token = self.storage.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?;
        Some(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub fn access_token(&self) -> Option<String> {
        let _guard = self.pair_lock.read().unwrap_or_else(PoisonError::into_inner);
        self.storage.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        let _guard = self.pair_lock.read().unwrap_or_else(PoisonError::into_inner);
        self.storage.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn save_user(&self, profile: &UserProfile) {
        match serde_json::to_string(profile) {
            Ok(json) => self.storage.set(USER_DATA_KEY, &json),
            Err(err) => warn!("Failed to serialize user snapshot: {}", err),
        }
    }

    /// Cached user snapshot; a corrupt entry reads as absent.
    pub fn read_user(&self) -> Option<UserProfile> {
        let raw = self.storage.get(USER_DATA_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!("Discarding unreadable user snapshot: {}", err);
                None
            }
        }
    }

    /// Removes tokens and the user snapshot. Safe to call when already empty.
    pub fn clear(&self) {
        let _guard = self.pair_lock.write().unwrap_or_else(PoisonError::into_inner);
        self.storage
            .remove_all(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY]);
        debug!("Session storage cleared");
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_save_and_clear() {
        let store = TokenStore::in_memory();
        assert!(store.read().is_none());

        store.save("a1", "r1");
        let pair = store.read().unwrap();
        assert_eq!(pair.access_token, "a1");
        assert_eq!(pair.refresh_token, "r1");

        store.clear();
        store.clear();
        assert!(store.read().is_none());
        assert!(store.access_token().is_none());
        assert!(store.read_user().is_none());
    }

    #[test]
    fn test_readers_never_see_mixed_pair() {
        let store = Arc::new(TokenStore::in_memory());
        store.save("a1", "r1");

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    if i % 2 == 0 {
                        store.save("a2", "r2");
                    } else {
                        store.save("a1", "r1");
                    }
                }
            })
        };

        for _ in 0..500 {
            let pair = store.read().unwrap();
            let suffix = &pair.access_token[1..];
            assert_eq!(&pair.refresh_token[1..], suffix);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_corrupt_user_snapshot_reads_as_absent() {
        let storage = MemoryStorage::new();
        storage.set(USER_DATA_KEY, "{not json");
        let store = TokenStore::new(storage);
        assert!(store.read_user().is_none());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = TokenStore::new(FileStorage::open(&path));
        store.save("access", "refresh");
        drop(store);

        let reopened = TokenStore::new(FileStorage::open(&path));
        assert_eq!(reopened.access_token().as_deref(), Some("access"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("refresh"));

        reopened.clear();
        let cleared = TokenStore::new(FileStorage::open(&path));
        assert!(cleared.read().is_none());
    }

    #[test]
    fn test_file_storage_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "garbage").unwrap();

        let store = TokenStore::new(FileStorage::open(&path));
        assert!(store.read().is_none());
    }
}
