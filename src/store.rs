//! Key/value state persistence shared by every monitor.
//!
//! Each game owns the keys under `game:<id>:`; only that game's monitor writes them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateCorruption, StoreError};
use crate::game::GameId;

pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    fn clear_namespace(&self, prefix: &str) -> Result<usize, StoreError>;
}

/// Field names stored per game.
pub mod field {
    pub const DATE: &str = "date";
    pub const START_TIME: &str = "start_time";
    pub const VENUE: &str = "venue";
    pub const STATUS: &str = "status";
    pub const MY_FIELD: &str = "my_field";
    pub const OPP_ID: &str = "opp_id";
    pub const HOME_TEAM: &str = "home_team";
    pub const AWAY_TEAM: &str = "away_team";
    pub const PRE_UPDATED: &str = "pre_updated";
    pub const PRE_SENT: &str = "pre_sent";
    pub const PAST_SCORES: &str = "past_scores";
    pub const NOTIFIED_PLAYS: &str = "notified_plays";
}

/// Builds the namespaced keys of one game.
#[derive(Debug, Clone)]
pub struct GameKeys {
    namespace: String,
}

impl GameKeys {
    pub fn new(game: GameId) -> Self {
        Self { namespace: format!("game:{game}:") }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, field: &str) -> String {
        format!("{}{}", self.namespace, field)
    }
}

/// Read a JSON value, treating a missing or corrupt value as `T::default()`.
pub fn read_json<T>(store: &dyn StateStore, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = store.get(key)? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(source) => {
            let corruption = StateCorruption { key: key.to_string(), source };
            warn!(error = %corruption, "Discarding corrupt persisted value");
            Ok(T::default())
        }
    }
}

pub fn write_json<T: Serialize + ?Sized>(store: &dyn StateStore, key: &str, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode { key: key.to_string(), source })?;
    store.set(key, &encoded)
}

/// Process-local store. State does not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear_namespace(&self, prefix: &str) -> Result<usize, StoreError> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        Ok(keys.len())
    }
}

/// Store backed by a single JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(body) if body.trim().is_empty() => BTreeMap::new(),
            Ok(body) => serde_json::from_str(&body).map_err(|source| StoreError::File { path: path.clone(), source })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = entries.len(), "Opened state file");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(entries)
            .map_err(|source| StoreError::File { path: self.path.clone(), source })?;
        // Write beside the target and rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io { path: self.path.clone(), source })
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn clear_namespace(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.flush(&entries)?;
        }
        Ok(removed)
    }
}

#[cfg(feature = "redis-store")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis-store")]
mod redis_store {
    use parking_lot::Mutex;
    use redis::Commands;

    use super::StateStore;
    use crate::error::StoreError;

    /// Store backed by a Redis server, the durable backend for long-running deployments.
    pub struct RedisStore {
        conn: Mutex<redis::Connection>,
    }

    impl RedisStore {
        pub fn connect(url: &str) -> Result<Self, StoreError> {
            let client = redis::Client::open(url)?;
            let conn = client.get_connection()?;
            Ok(Self { conn: Mutex::new(conn) })
        }
    }

    impl StateStore for RedisStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let mut guard = self.conn.lock();
            let conn: &mut redis::Connection = &mut guard;
            Ok(conn.get::<_, Option<String>>(key)?)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            let mut guard = self.conn.lock();
            let conn: &mut redis::Connection = &mut guard;
            conn.set::<_, _, ()>(key, value)?;
            Ok(())
        }

        fn clear_namespace(&self, prefix: &str) -> Result<usize, StoreError> {
            let mut guard = self.conn.lock();
            let conn: &mut redis::Connection = &mut guard;
            let keys: Vec<String> = conn.scan_match::<_, String>(format!("{prefix}*"))?.collect();
            if !keys.is_empty() {
                conn.del::<_, ()>(keys.as_slice())?;
            }
            Ok(keys.len())
        }
    }
}
