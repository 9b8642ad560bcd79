//! Content hashing for policy directories.

use sha2::{Digest, Sha256};
use std::ffi::OsString;

/// A single file of a policy directory: name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFile {
    /// File name relative to the policy directory, exactly as listed
    pub name: OsString,
    /// Raw file contents
    pub content: Vec<u8>,
}

impl PolicyFile {
    pub fn new(name: impl Into<OsString>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Compute the integrity hash of a set of policy files.
///
/// Files are sorted by name before hashing, so the result does not depend on
/// directory listing order. Each file contributes the raw bytes of its name
/// (not a lossy UTF-8 rendering), a NUL separator,
/// the content length as big-endian u64 and the content itself; renaming a
/// file or moving bytes between files always changes the digest.
pub fn hash_policy_files(files: &[PolicyFile]) -> String {
    let mut sorted: Vec<&PolicyFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.name.as_encoded_bytes());
        hasher.update([0u8]);
        hasher.update((file.content.len() as u64).to_be_bytes());
        hasher.update(&file.content);
    }
    hex::encode(hasher.finalize())
}
