//! Integrity checks for human-authored policy directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::fs::{LocalFs, PolicyFs};
use super::hash::{hash_policy_files, PolicyFile};
use super::store::{FileHashStore, HashStore, HashStoreError, MemoryHashStore};
use crate::events::{EventHooks, WardenEvent};

/// Result status of an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    /// No hash has been accepted for this scope/identifier
    New,
    /// The stored hash equals the computed hash
    Match,
    /// The policy files changed since they were last accepted
    Mismatch,
}

impl std::fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityStatus::New => write!(f, "NEW"),
            IntegrityStatus::Match => write!(f, "MATCH"),
            IntegrityStatus::Mismatch => write!(f, "MISMATCH"),
        }
    }
}

/// Outcome of [`PolicyIntegrityManager::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityCheck {
    /// Comparison against the stored hash
    pub status: IntegrityStatus,
    /// Hash computed from the directory contents
    pub hash: String,
    /// Number of files that were hashed
    pub file_count: usize,
}

impl IntegrityCheck {
    /// Whether the user must review the directory before it is trusted.
    pub fn needs_review(&self) -> bool {
        self.status != IntegrityStatus::Match
    }
}

/// Errors from integrity checks.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    /// The policy directory (or a file in it) could not be read.
    #[error("Failed to read policy files at {path}: {source}")]
    Fs {
        /// Directory or file that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The hash store failed.
    #[error(transparent)]
    Store(#[from] HashStoreError),
}

/// Detects unreviewed changes to policy directories.
///
/// `check` never writes; only an explicit `accept` (after the user has
/// reviewed a `New` or `Mismatch` result) records a hash.
///
/// # Example
///
/// ```rust
/// use warden_core::integrity::{IntegrityStatus, PolicyIntegrityManager};
///
/// # tokio_test::block_on(async {
/// let dir = std::env::temp_dir().join(format!("warden-doc-{}", std::process::id()));
/// std::fs::create_dir_all(&dir).unwrap();
/// std::fs::write(dir.join("rules.toml"), "deny = [\"rm\"]").unwrap();
///
/// let manager = PolicyIntegrityManager::in_memory();
/// let check = manager.check("workspace", "my-project", &dir).await.unwrap();
/// assert_eq!(check.status, IntegrityStatus::New);
///
/// manager.accept("workspace", "my-project", &check.hash).await.unwrap();
/// let check = manager.check("workspace", "my-project", &dir).await.unwrap();
/// assert_eq!(check.status, IntegrityStatus::Match);
/// # std::fs::remove_dir_all(&dir).unwrap();
/// # });
/// ```
pub struct PolicyIntegrityManager {
    fs: Arc<dyn PolicyFs>,
    store: Arc<dyn HashStore>,
    hooks: EventHooks,
}

impl PolicyIntegrityManager {
    /// Create a manager over the given filesystem and store.
    pub fn new(fs: impl PolicyFs + 'static, store: impl HashStore + 'static) -> Self {
        Self {
            fs: Arc::new(fs),
            store: Arc::new(store),
            hooks: EventHooks::new(),
        }
    }

    /// Local filesystem with hashes persisted to `store_path`.
    pub fn with_file_store(store_path: impl Into<PathBuf>) -> Self {
        Self::new(LocalFs, FileHashStore::new(store_path))
    }

    /// Local filesystem with hashes kept in memory.
    pub fn in_memory() -> Self {
        Self::new(LocalFs, MemoryHashStore::new())
    }

    /// Emit events to a shared hook registry.
    pub fn with_hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Storage key for a scope/identifier pair.
    pub fn key(scope: &str, identifier: &str) -> String {
        format!("{}:{}", scope, identifier)
    }

    /// Compute the directory hash and compare it with the stored one.
    ///
    /// Fails if the directory cannot be read; an unreadable directory is
    /// never reported as `New`.
    pub async fn check(
        &self,
        scope: &str,
        identifier: &str,
        policy_dir: &Path,
    ) -> Result<IntegrityCheck, IntegrityError> {
        let key = Self::key(scope, identifier);
        let files = self.read_policy_files(policy_dir).await?;
        let hash = hash_policy_files(&files);

        let status = match self.store.get(&key).await? {
            None => IntegrityStatus::New,
            Some(stored) if stored == hash => IntegrityStatus::Match,
            Some(_) => IntegrityStatus::Mismatch,
        };

        match status {
            IntegrityStatus::Mismatch => log::warn!(
                "Policy files for {} changed since they were last accepted",
                key
            ),
            _ => log::debug!("Policy integrity for {}: {}", key, status),
        }

        self.hooks.emit(WardenEvent::IntegrityChecked {
            key,
            status,
            file_count: files.len(),
        });

        Ok(IntegrityCheck {
            status,
            hash,
            file_count: files.len(),
        })
    }

    /// Record `hash` as the reviewed state of a scope/identifier.
    ///
    /// Only the given key is touched; concurrent accepts for different keys
    /// are serialized by the store.
    pub async fn accept(
        &self,
        scope: &str,
        identifier: &str,
        hash: &str,
    ) -> Result<(), IntegrityError> {
        let key = Self::key(scope, identifier);
        self.store.set(&key, hash).await?;
        log::info!("Accepted policy integrity hash for {}", key);
        self.hooks.emit(WardenEvent::IntegrityAccepted {
            key,
            hash: hash.to_string(),
        });
        Ok(())
    }

    async fn read_policy_files(&self, dir: &Path) -> Result<Vec<PolicyFile>, IntegrityError> {
        let names = self
            .fs
            .list_files(dir)
            .await
            .map_err(|source| IntegrityError::Fs {
                path: dir.to_path_buf(),
                source,
            })?;

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(&name);
            let content = self
                .fs
                .read_file(&path)
                .await
                .map_err(|source| IntegrityError::Fs { path, source })?;
            files.push(PolicyFile { name, content });
        }
        Ok(files)
    }
}

impl std::fmt::Debug for PolicyIntegrityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyIntegrityManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::ffi::OsString;
    use std::io;

    /// In-memory filesystem that lists files in a fixed (possibly reversed) order.
    struct FixtureFs {
        files: HashMap<String, Vec<u8>>,
        reverse: bool,
    }

    #[async_trait]
    impl PolicyFs for FixtureFs {
        async fn list_files(&self, _dir: &Path) -> io::Result<Vec<OsString>> {
            let mut names: Vec<OsString> = self.files.keys().map(OsString::from).collect();
            names.sort();
            if self.reverse {
                names.reverse();
            }
            Ok(names)
        }

        async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.files
                .get(&name)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name))
        }
    }

    fn fixture(reverse: bool) -> FixtureFs {
        FixtureFs {
            files: HashMap::from([
                ("a.toml".to_string(), b"allow = [\"read_file\"]".to_vec()),
                ("b.toml".to_string(), b"deny = [\"rm\"]".to_vec()),
                ("c.toml".to_string(), b"ask = [\"shell\"]".to_vec()),
            ]),
            reverse,
        }
    }

    #[tokio::test]
    async fn test_listing_order_does_not_change_hash() {
        let dir = Path::new("/policies");
        let forward = PolicyIntegrityManager::new(fixture(false), MemoryHashStore::new());
        let backward = PolicyIntegrityManager::new(fixture(true), MemoryHashStore::new());

        let a = forward.check("user", "default", dir).await.unwrap();
        let b = backward.check("user", "default", dir).await.unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.file_count, 3);
    }

    #[tokio::test]
    async fn test_check_does_not_persist() {
        let manager = PolicyIntegrityManager::new(fixture(false), MemoryHashStore::new());
        let dir = Path::new("/policies");

        let first = manager.check("user", "default", dir).await.unwrap();
        let second = manager.check("user", "default", dir).await.unwrap();
        assert_eq!(first.status, IntegrityStatus::New);
        assert_eq!(second.status, IntegrityStatus::New);
        assert!(first.needs_review());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_error_not_new() {
        struct BrokenRead;

        #[async_trait]
        impl PolicyFs for BrokenRead {
            async fn list_files(&self, _dir: &Path) -> io::Result<Vec<OsString>> {
                Ok(vec!["a.toml".into()])
            }
            async fn read_file(&self, _path: &Path) -> io::Result<Vec<u8>> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            }
        }

        let manager = PolicyIntegrityManager::new(BrokenRead, MemoryHashStore::new());
        let err = manager
            .check("user", "default", Path::new("/policies"))
            .await
            .unwrap_err();
        match err {
            IntegrityError::Fs { path, source } => {
                assert_eq!(path, Path::new("/policies/a.toml"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected Fs error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let hooks = EventHooks::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        hooks.add(move |e: &WardenEvent| s.lock().push(e.name()));

        let manager =
            PolicyIntegrityManager::new(fixture(false), MemoryHashStore::new()).with_hooks(hooks);
        let check = manager
            .check("user", "default", Path::new("/p"))
            .await
            .unwrap();
        manager.accept("user", "default", &check.hash).await.unwrap();

        assert_eq!(*seen.lock(), vec!["integrity_checked", "integrity_accepted"]);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(IntegrityStatus::New.to_string(), "NEW");
        assert_eq!(IntegrityStatus::Match.to_string(), "MATCH");
        assert_eq!(IntegrityStatus::Mismatch.to_string(), "MISMATCH");
        assert_eq!(
            serde_json::to_string(&IntegrityStatus::Mismatch).unwrap(),
            "\"MISMATCH\""
        );
    }
}
