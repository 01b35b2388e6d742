//! Content-addressed kernel cache storage and cross-process build locks.
//!
//! The cache root is shared by every process that builds kernels. Entries are
//! keyed by [`Digest`](kiln_common::Digest) and coordinated purely through the
//! filesystem: atomic directory creation for locks and rename-into-place for
//! artifacts.

#![warn(missing_docs)]

pub mod error;
pub mod lock;
pub mod store;

pub use error::CacheError;
pub use lock::{
    list_locks, BuildLocks, LockEntry, LockGuard, COMPILATION_DEPTH, LOCKS_DIR, MAX_LOCK_DEPTH,
    TRANSLATION_DEPTH,
};
pub use store::{binary_file_name, read_file, ArtifactKind, CacheStore, KERNELS_DIR};
