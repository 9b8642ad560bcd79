//! Hash storage trait and implementations.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

type WriteLock = Arc<tokio::sync::Mutex<()>>;

/// Writer locks shared by every [`FileHashStore`] in the process, keyed by
/// absolute store path.
static WRITE_LOCKS: parking_lot::Mutex<BTreeMap<PathBuf, Weak<tokio::sync::Mutex<()>>>> =
    parking_lot::const_mutex(BTreeMap::new());

fn write_lock_for(path: &Path) -> WriteLock {
    let key = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut locks = WRITE_LOCKS.lock();
    locks.retain(|_, lock| lock.strong_count() > 0);
    if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = Arc::new(tokio::sync::Mutex::new(()));
    locks.insert(key, Arc::downgrade(&lock));
    lock
}

/// Errors that can occur in hash store operations.
#[derive(Debug, thiserror::Error)]
pub enum HashStoreError {
    /// IO error during storage operations.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The store file is not a JSON object of strings.
    #[error("Corrupt integrity store {path}: {source}")]
    Json {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Trait for integrity hash storage.
///
/// Maps `"{scope}:{identifier}"` keys to hex SHA-256 strings.
/// Implementations must serialize writers so concurrent `set` calls for
/// different keys never lose each other's updates.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Look up the stored hash for a key.
    async fn get(&self, key: &str) -> Result<Option<String>, HashStoreError>;

    /// Store the hash for a key, replacing any previous value.
    async fn set(&self, key: &str, hash: &str) -> Result<(), HashStoreError>;

    /// Remove the hash for a key.
    ///
    /// Returns `true` if a hash was removed, `false` if not found.
    async fn remove(&self, key: &str) -> Result<bool, HashStoreError>;

    /// Load every stored key/hash pair.
    async fn load_all(&self) -> Result<BTreeMap<String, String>, HashStoreError>;
}

/// In-memory hash store.
///
/// Hashes are forgotten when the process exits. Useful for tests and for
/// sessions that must re-confirm policies every run.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    hashes: parking_lot::RwLock<BTreeMap<String, String>>,
}

impl MemoryHashStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HashStoreError> {
        Ok(self.hashes.read().get(key).cloned())
    }

    async fn set(&self, key: &str, hash: &str) -> Result<(), HashStoreError> {
        self.hashes.write().insert(key.to_string(), hash.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, HashStoreError> {
        Ok(self.hashes.write().remove(key).is_some())
    }

    async fn load_all(&self) -> Result<BTreeMap<String, String>, HashStoreError> {
        Ok(self.hashes.read().clone())
    }
}

/// File-based hash store.
///
/// Hashes are persisted to a single JSON object file. The file is created
/// (with parent directories) on the first write; a missing or empty file
/// reads as an empty map. Every read goes to disk so hashes accepted by
/// another process are observed.
///
/// All stores in a process that point at the same file share one writer
/// lock, so managers created independently never drop each other's accepts.
#[derive(Debug)]
pub struct FileHashStore {
    path: PathBuf,
    write_lock: WriteLock,
}

impl FileHashStore {
    /// Create a store backed by the file at `path`.
    ///
    /// The file does not need to exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            write_lock: write_lock_for(&path),
            path,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, HashStoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(HashStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| HashStoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the map via a uniquely named temp file and rename so readers
    /// never see a partially written store.
    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), HashStoreError> {
        let json = serde_json::to_vec_pretty(map).map_err(|source| HashStoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist_atomically(&path, &json))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result)
            .map_err(|source| HashStoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

fn persist_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl HashStore for FileHashStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HashStoreError> {
        Ok(self.read_map().await?.remove(key))
    }

    async fn set(&self, key: &str, hash: &str) -> Result<(), HashStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), hash.to_string());
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<bool, HashStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        let removed = map.remove(key).is_some();
        if removed {
            self.write_map(&map).await?;
        }
        Ok(removed)
    }

    async fn load_all(&self) -> Result<BTreeMap<String, String>, HashStoreError> {
        self.read_map().await
    }
}
