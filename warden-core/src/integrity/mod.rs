//! Policy integrity tracking.
//!
//! Human-authored policy directories are hashed and compared against the
//! hash the user last accepted, so edits made outside the agent are surfaced
//! for review instead of being applied silently.
//!
//! # Overview
//!
//! - **[`PolicyIntegrityManager`]**: `check` / `accept` entry points
//! - **[`HashStore`]**: Trait for persisting accepted hashes
//! - **[`MemoryHashStore`]**: In-memory store (cleared on exit)
//! - **[`FileHashStore`]**: Single JSON file mapping `"{scope}:{identifier}"` to a hash
//! - **[`PolicyFs`]**: Directory listing / file reading seam, [`LocalFs`] by default
//!
//! # Hash Rules
//!
//! | Change | Hash changes? |
//! |--------|---------------|
//! | Directory listed in a different order | No |
//! | Any byte of any file | Yes |
//! | A file renamed, added or removed | Yes |

mod fs;
mod hash;
mod manager;
mod store;

pub use fs::{LocalFs, PolicyFs};
pub use hash::{hash_policy_files, PolicyFile};
pub use manager::{IntegrityCheck, IntegrityError, IntegrityStatus, PolicyIntegrityManager};
pub use store::{FileHashStore, HashStore, HashStoreError, MemoryHashStore};
