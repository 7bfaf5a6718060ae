//! Scoped key/value persistence for the session projection.
//!
//! SYSTEM CONTEXT
//! ==============
//! A reload must restore the previous session without re-authenticating, so
//! `{credential, profile}` is mirrored into one namespaced entry of a
//! per-session store. The store is never a source of truth: it is written
//! from `SessionState` on every change and read only at construction.
//!
//! ERROR HANDLING
//! ==============
//! Persistence is best-effort. Store failures and corrupt entries are logged
//! and degrade to an empty session instead of failing auth operations.
//! `FileStore` replaces its file by rename, so an interrupted write leaves
//! the previous contents intact.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::profile::Profile;

// =============================================================================
// STORE TRAIT
// =============================================================================

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory store. Clones share entries, which is how a simulated reload of
/// the same tab sees what the previous instance wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// A JSON object file of string entries. Lets the CLI keep its session
/// between runs.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_all(&self) -> HashMap<String, String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "session store read failed");
                return HashMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %self.path.display(), "session store is corrupt; ignoring");
            HashMap::new()
        })
    }

    /// Sibling file the next contents are staged in before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Stage the whole file next to the target, then rename over it so a
    /// reader never sees a half-written store.
    fn write_all(&self, entries: &HashMap<String, String>) {
        let staging = self.staging_path();
        let result = serde_json::to_string_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|raw| std::fs::write(&staging, raw))
            .and_then(|()| std::fs::rename(&staging, &self.path));
        if let Err(e) = result {
            let _ = std::fs::remove_file(&staging);
            tracing::warn!(error = %e, path = %self.path.display(), "session store write failed");
        }
    }

    fn modify(&self, f: impl FnOnce(&mut HashMap<String, String>)) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all();
        f(&mut entries);
        self.write_all(&entries);
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.modify(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        });
    }

    fn remove(&self, key: &str) {
        self.modify(|entries| {
            entries.remove(key);
        });
    }
}

// =============================================================================
// SESSION PROJECTION
// =============================================================================

/// The persisted subset of `SessionState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub credential: Option<String>,
    pub profile: Option<Profile>,
}

impl PersistedSession {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credential.is_none() && self.profile.is_none()
    }
}

/// Reads and writes the projection under one namespaced key.
#[derive(Clone)]
pub struct SessionPersistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionPersistence {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the projection. Missing or corrupt entries load as empty.
    #[must_use]
    pub fn load(&self) -> PersistedSession {
        let Some(raw) = self.store.get(&self.key) else {
            return PersistedSession::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, key = %self.key, "persisted session is corrupt; starting empty");
            PersistedSession::default()
        })
    }

    pub fn save(&self, session: &PersistedSession) {
        if session.is_empty() {
            self.clear();
            return;
        }
        match serde_json::to_string(session) {
            Ok(raw) => self.store.set(&self.key, &raw),
            Err(e) => tracing::warn!(error = %e, key = %self.key, "persisted session encode failed"),
        }
    }

    pub fn clear(&self) {
        self.store.remove(&self.key);
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
