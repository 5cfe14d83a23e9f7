//! Persisted client state: a small durable key/value store.
//!
//! Each key has exactly one owning component (see [`keys`]); components never
//! write keys they do not own.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub mod keys {
    // Session
    pub const AUTH_TOKEN: &str = "auth_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER: &str = "user";

    // Tenant resolver
    pub const CURRENT_TENANT: &str = "current_tenant";

    // Theme store
    pub const TENANT_THEMES: &str = "tenant_themes";
    pub const THEME_MODE: &str = "theme_mode";
}

pub type StorageResult<T> = Result<T, StorageError>;

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Typed JSON access on top of any [`Storage`]
pub trait StorageExt: Storage {
    /// Read and decode a key. Undecodable values are treated as absent.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring corrupt value under '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// In-memory storage, used by tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a consistent map: every write is a single insert/remove.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Storage backed by a single `state.json` file in a config directory
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        let path = dir.join("state.json");

        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Open the default config directory
    pub fn open_default() -> StorageResult<Self> {
        Self::open(default_config_dir()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<F>(&self, f: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("state lock poisoned".to_string()))?;
        f(&mut entries);
        let content = serde_json::to_string_pretty(&*entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("state lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

pub fn default_config_dir() -> StorageResult<PathBuf> {
    if let Ok(custom_dir) = std::env::var("LMS_ADMIN_CONFIG_DIR") {
        return Ok(PathBuf::from(custom_dir));
    }
    let home = std::env::var("HOME")
        .map_err(|_| StorageError::Unavailable("HOME environment variable not set".to_string()))?;
    Ok(PathBuf::from(home).join(".config").join("lms-admin"))
}
