//! Run registry: the durable `run_id → original file name` map.
//!
//! The store is shared by every run that points at it, so
//! [`RegistryStore::update`] is the only mutation the pipeline uses. The
//! JSON-file backend serialises concurrent updates (threads or processes)
//! with an OS advisory lock on `<registry>.lock` and replaces the store by
//! atomic rename, so readers never observe a half-written file and no update
//! is lost.
//!
//! The lock file itself is never deleted. The kernel releases the lock when
//! its holder closes the handle or dies, so a crashed run leaves at most an
//! unlocked, empty `<registry>.lock` behind.
//!
//! Store operations are blocking; the pipeline calls them from
//! `spawn_blocking`.

use crate::error::RegistryError;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Registry contents. Ordered so the file diff stays stable between runs.
pub type Registry = BTreeMap<String, String>;

/// Interval between attempts to take a contended registry lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Storage backend for the run registry.
pub trait RegistryStore: Send + Sync {
    /// Read the whole registry; an absent store is an empty registry.
    fn load(&self) -> Result<Registry, RegistryError>;

    /// Replace the whole registry.
    fn save(&self, registry: &Registry) -> Result<(), RegistryError>;

    /// Set `registry[key] = value` and return the registry as written.
    ///
    /// The default is an unguarded load-modify-save; backends shared between
    /// concurrent writers must override it.
    fn update(&self, key: &str, value: &str) -> Result<Registry, RegistryError> {
        let mut registry = self.load()?;
        registry.insert(key.to_string(), value.to_string());
        self.save(&registry)?;
        Ok(registry)
    }
}

/// Pretty-printed JSON object on disk (`files_dict.json` by default).
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
    lock_timeout: Duration,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: Duration::from_secs(10),
        }
    }

    /// How long [`RegistryStore::update`] waits for another writer.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.lock`
    pub fn lock_path(&self) -> PathBuf {
        let mut s = self.path.as_os_str().to_owned();
        s.push(".lock");
        PathBuf::from(s)
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Take the exclusive lock, polling until `lock_timeout` elapses.
    fn acquire_lock(&self) -> Result<LockGuard, RegistryError> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir).map_err(|e| self.io_err(&dir, e))?;

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| self.io_err(&lock_path, e))?;

        let start = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(LockGuard { file, path: lock_path }),
                Err(TryLockError::WouldBlock) => {
                    if start.elapsed() >= self.lock_timeout {
                        return Err(RegistryError::LockTimeout {
                            path: lock_path,
                            secs: self.lock_timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(TryLockError::Error(e)) => return Err(self.io_err(&lock_path, e)),
            }
        }
    }
}

impl RegistryStore for JsonFileRegistry {
    fn load(&self) -> Result<Registry, RegistryError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Registry::new()),
            Err(e) => return Err(self.io_err(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Registry::new());
        }
        serde_json::from_str(&text).map_err(|e| RegistryError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir).map_err(|e| self.io_err(&dir, e))?;

        let mut json = serde_json::to_string_pretty(registry).map_err(|e| RegistryError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        json.push('\n');

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_err(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| self.io_err(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_err(&self.path, e.error))?;
        debug!("Registry saved: {} entries", registry.len());
        Ok(())
    }

    fn update(&self, key: &str, value: &str) -> Result<Registry, RegistryError> {
        let _guard = self.acquire_lock()?;
        let mut registry = self.load()?;
        registry.insert(key.to_string(), value.to_string());
        self.save(&registry)?;
        Ok(registry)
    }
}

/// Holds the registry lock until dropped.
struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("Failed to release registry lock {}: {}", self.path.display(), e);
        }
    }
}

/// In-process registry, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: Mutex<Registry>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RegistryStore for MemoryRegistry {
    fn load(&self) -> Result<Registry, RegistryError> {
        Ok(self.lock().clone())
    }

    fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        *self.lock() = registry.clone();
        Ok(())
    }

    fn update(&self, key: &str, value: &str) -> Result<Registry, RegistryError> {
        let mut guard = self.lock();
        guard.insert(key.to_string(), value.to_string());
        Ok(guard.clone())
    }
}
