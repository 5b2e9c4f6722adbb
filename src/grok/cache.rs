//! TTL caches for slow-changing upstream data.
//!
//! Expiry is lazy: an entry past its deadline is dropped the next time its key
//! is read or written. There is no background sweep.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::grok::clock::{duration_millis, Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: u64,
}

/// In-memory key/value cache with a fixed per-entry TTL.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a live value, dropping the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if now > entry.expires_at => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store a value; its expiry is `now + ttl` regardless of any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let expires_at = self.clock.now_millis().saturating_add(duration_millis(self.ttl));
        self.insert_with_expiry(key.into(), value, expires_at);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn insert_with_expiry(&self, key: String, value: V, expires_at: u64) {
        self.lock().insert(key, CacheEntry { value, expires_at });
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    fn snapshot(&self) -> Vec<(String, V, u64)> {
        self.lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone(), e.expires_at))
            .collect()
    }
}

/// On-disk record for one cache entry
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry<V> {
    value: V,
    expires_at: u64,
}

/// [`TtlCache`] mirrored to a JSON file.
///
/// The file is rewritten after every `set` and reloaded on construction with
/// the stored expiry times. Any file I/O failure is logged at debug level and
/// otherwise ignored; the cache keeps working in memory.
#[derive(Debug)]
pub struct PersistentCache<V> {
    memory: TtlCache<V>,
    path: PathBuf,
    /// Serialises snapshot+write so an older snapshot never lands last.
    write_lock: Mutex<()>,
}

impl<V> PersistentCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::open_with_clock(path, ttl, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let cache = Self {
            memory: TtlCache::with_clock(ttl, clock),
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        cache.load();
        cache
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.memory.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.memory.set(key, value);
        self.save();
    }

    /// Empty the cache and delete the backing file.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.memory.clear();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("Failed to remove cache file {}: {}", self.path.display(), e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn load(&self) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Cache file {} not loaded: {}", self.path.display(), e);
                return;
            }
        };

        let stored: HashMap<String, StoredEntry<V>> = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::debug!("Ignoring unreadable cache file {}: {}", self.path.display(), e);
                return;
            }
        };

        let now = self.memory.now_millis();
        let mut loaded = 0usize;
        for (key, entry) in stored {
            if entry.expires_at < now {
                continue;
            }
            self.memory.insert_with_expiry(key, entry.value, entry.expires_at);
            loaded += 1;
        }
        tracing::debug!("Loaded {} cache entries from {}", loaded, self.path.display());
    }

    fn save(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored: HashMap<String, StoredEntry<V>> = self
            .memory
            .snapshot()
            .into_iter()
            .map(|(key, value, expires_at)| (key, StoredEntry { value, expires_at }))
            .collect();

        if let Err(e) = write_json(&self.path, &stored) {
            tracing::debug!("Failed to persist cache to {}: {}", self.path.display(), e);
        }
    }
}

/// Write through a sibling temp file so readers never see a torn file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}
