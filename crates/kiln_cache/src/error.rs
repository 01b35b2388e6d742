//! Error types for cache and lock operations.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur during cache and lock operations.
///
/// Filesystem failures are always reported; they are never turned into a
/// cache miss, because a false miss would trigger a rebuild over an entry
/// another process may be using.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The stored checksum does not match the checksum of the artifact on disk.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The artifact file path.
        path: PathBuf,
        /// The checksum recorded when the artifact was published.
        expected: String,
        /// The checksum of the artifact as currently stored.
        actual: String,
    },

    /// A cache file exists but its contents cannot be interpreted.
    #[error("corrupt cache file {path}: {reason}")]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// Why it could not be read.
        reason: String,
    },

    /// A published binary has no recorded checksum.
    #[error("missing checksum for {path}")]
    MissingChecksum {
        /// The artifact file path.
        path: PathBuf,
    },

    /// A lock depth outside the supported range was requested.
    #[error("lock depth {depth} out of range (max {max})")]
    InvalidLockDepth {
        /// The requested depth.
        depth: u8,
        /// The largest supported depth.
        max: u8,
    },

    /// A bounded wait on a lock elapsed while the lock was still held.
    #[error("timed out after {waited:?} waiting for lock {lock}")]
    LockTimeout {
        /// The lock directory that stayed present.
        lock: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
