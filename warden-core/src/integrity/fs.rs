//! Filesystem access for policy directories.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::Path;

/// Reads policy directories.
///
/// Abstracted so integrity checks can run against in-memory fixtures or
/// remote storage.
#[async_trait]
pub trait PolicyFs: Send + Sync {
    /// List the names of the regular files directly inside `dir`.
    ///
    /// Names are returned as the OS reports them, so joining one onto `dir`
    /// yields a path [`read_file`](Self::read_file) can open. Order is
    /// unspecified.
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>>;

    /// Read the full contents of a file.
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`PolicyFs`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl PolicyFs for LocalFs {
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Follow symlinks so a linked policy file is hashed like a regular one
            let metadata = tokio::fs::metadata(entry.path()).await?;
            if metadata.is_file() {
                names.push(entry.file_name());
            }
        }
        Ok(names)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}
