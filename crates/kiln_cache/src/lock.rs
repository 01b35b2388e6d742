//! Cross-process build locks backed by lock directories.
//!
//! A lock is the directory `<cache_root>/locks/<digest>_<depth>`. Creating it
//! is the atomic test-and-set: exactly one `mkdir` succeeds per lock, across
//! every process sharing the cache root. Removing it releases the lock.
//!
//! There is no lease or heartbeat. A holder that dies between acquire and
//! release leaves the directory behind, and every waiter on that lock blocks
//! until something outside this crate removes it. [`list_locks`] reports lock
//! directories present on disk so such leftovers can be found.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use kiln_common::Digest;
use log::{debug, warn};

use crate::error::CacheError;

/// Subdirectory of the cache root holding lock directories.
pub const LOCKS_DIR: &str = "locks";

/// Largest supported lock depth; depths `0..=MAX_LOCK_DEPTH` are valid.
pub const MAX_LOCK_DEPTH: u8 = 9;

/// Depth of the lock guarding translation of a cache entry.
pub const TRANSLATION_DEPTH: u8 = 0;

/// Depth of the lock guarding native compilation of a cache entry.
pub const COMPILATION_DEPTH: u8 = 1;

const POLL_START: Duration = Duration::from_millis(1);
const POLL_MAX: Duration = Duration::from_millis(32);

/// Lock directories for one cache root, plus the set this process holds.
///
/// The held set is process-local bookkeeping only; mutual exclusion comes
/// entirely from the filesystem. Dropping the table releases every lock it
/// still holds.
pub struct BuildLocks {
    locks_dir: PathBuf,
    held: Mutex<BTreeSet<PathBuf>>,
}

impl BuildLocks {
    /// Creates the lock table for a cache root. Nothing is created on disk yet.
    pub fn new(cache_root: &Path) -> Self {
        Self {
            locks_dir: cache_root.join(LOCKS_DIR),
            held: Mutex::new(BTreeSet::new()),
        }
    }

    /// Returns the lock directory path for `(digest, depth)`.
    pub fn lock_path(&self, digest: &Digest, depth: u8) -> PathBuf {
        self.locks_dir.join(format!("{digest}_{depth}"))
    }

    /// Tries to take the lock. Returns `Ok(false)` if another holder has it.
    pub fn acquire(&self, digest: &Digest, depth: u8) -> Result<bool, CacheError> {
        check_depth(depth)?;
        std::fs::create_dir_all(&self.locks_dir)
            .map_err(|e| CacheError::io(&self.locks_dir, e))?;

        let lock = self.lock_path(digest, depth);
        match std::fs::create_dir(&lock) {
            Ok(()) => {
                debug!("acquired lock {}", lock.display());
                self.held_set().insert(lock);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(CacheError::io(lock, e)),
        }
    }

    /// Like [`acquire`](Self::acquire), but returns a guard that releases on drop.
    pub fn try_lock(&self, digest: &Digest, depth: u8) -> Result<Option<LockGuard<'_>>, CacheError> {
        Ok(self.acquire(digest, depth)?.then(|| LockGuard {
            locks: self,
            digest: *digest,
            depth,
            released: false,
        }))
    }

    /// Blocks until the lock directory disappears.
    ///
    /// Polls with a short, capped backoff and never times out.
    pub fn wait(&self, digest: &Digest, depth: u8) -> Result<(), CacheError> {
        check_depth(depth)?;
        let lock = self.lock_path(digest, depth);
        let mut delay = POLL_START;
        while lock_present(&lock)? {
            std::thread::sleep(delay);
            delay = (delay * 2).min(POLL_MAX);
        }
        Ok(())
    }

    /// Blocks until the lock directory disappears or `timeout` elapses.
    ///
    /// On timeout the lock is left untouched; only its holder may remove it.
    pub fn wait_timeout(
        &self,
        digest: &Digest,
        depth: u8,
        timeout: Duration,
    ) -> Result<(), CacheError> {
        check_depth(depth)?;
        let lock = self.lock_path(digest, depth);
        let start = Instant::now();
        let mut delay = POLL_START;
        while lock_present(&lock)? {
            let waited = start.elapsed();
            if waited >= timeout {
                warn!(
                    "lock {} still held after {waited:?}; its holder may have crashed",
                    lock.display()
                );
                return Err(CacheError::LockTimeout { lock, waited });
            }
            std::thread::sleep(delay.min(timeout - waited));
            delay = (delay * 2).min(POLL_MAX);
        }
        Ok(())
    }

    /// Removes the lock directory. Releasing a lock that is not present is not an error.
    pub fn release(&self, digest: &Digest, depth: u8) -> Result<(), CacheError> {
        check_depth(depth)?;
        self.release_path(&self.lock_path(digest, depth))
    }

    fn release_path(&self, lock: &Path) -> Result<(), CacheError> {
        self.held_set().remove(lock);
        match std::fs::remove_dir(lock) {
            Ok(()) => {
                debug!("released lock {}", lock.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(lock, e)),
        }
    }

    /// Returns `true` if the lock directory currently exists (held by anyone).
    pub fn is_locked(&self, digest: &Digest, depth: u8) -> Result<bool, CacheError> {
        check_depth(depth)?;
        lock_present(&self.lock_path(digest, depth))
    }

    /// Lock directories acquired by this table and not yet released.
    pub fn held(&self) -> Vec<PathBuf> {
        self.held_set().iter().cloned().collect()
    }

    /// Releases every lock this table still holds. Returns how many were released.
    ///
    /// Failures are logged and skipped so that one bad entry does not keep the
    /// others locked.
    pub fn release_all(&self) -> usize {
        let held: Vec<PathBuf> = std::mem::take(&mut *self.held_set()).into_iter().collect();
        let mut released = 0;
        for lock in held {
            warn!("releasing leftover lock {}", lock.display());
            match self.release_path(&lock) {
                Ok(()) => released += 1,
                Err(e) => warn!("failed to release {}: {e}", lock.display()),
            }
        }
        released
    }

    fn held_set(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        // The set holds plain paths, so a poisoned guard is still consistent.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for BuildLocks {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// A held lock that is released when dropped.
pub struct LockGuard<'a> {
    locks: &'a BuildLocks,
    digest: Digest,
    depth: u8,
    released: bool,
}

impl LockGuard<'_> {
    /// Releases the lock now, reporting any filesystem error.
    pub fn release(mut self) -> Result<(), CacheError> {
        self.released = true;
        self.locks.release(&self.digest, self.depth)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.locks.release(&self.digest, self.depth) {
                warn!("failed to release lock on drop: {e}");
            }
        }
    }
}

/// A lock directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    /// Digest the lock covers.
    pub digest: Digest,
    /// Lock depth.
    pub depth: u8,
    /// Full path of the lock directory.
    pub path: PathBuf,
}

/// Lists the lock directories currently present under `cache_root`.
///
/// Entries whose names do not parse as `<digest>_<depth>` are ignored.
pub fn list_locks(cache_root: &Path) -> Result<Vec<LockEntry>, CacheError> {
    let dir = cache_root.join(LOCKS_DIR);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io(dir, e)),
    };

    let mut locks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(&dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((digest, depth)) = name.rsplit_once('_') else {
            continue;
        };
        if let (Ok(digest), Ok(depth)) = (digest.parse::<Digest>(), depth.parse::<u8>()) {
            locks.push(LockEntry {
                digest,
                depth,
                path,
            });
        }
    }
    locks.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(locks)
}

fn check_depth(depth: u8) -> Result<(), CacheError> {
    if depth > MAX_LOCK_DEPTH {
        return Err(CacheError::InvalidLockDepth {
            depth,
            max: MAX_LOCK_DEPTH,
        });
    }
    Ok(())
}

fn lock_present(lock: &Path) -> Result<bool, CacheError> {
    match std::fs::metadata(lock) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::io(lock, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, BuildLocks, Digest) {
        let dir = tempfile::tempdir().unwrap();
        let locks = BuildLocks::new(dir.path());
        (dir, locks, Digest::of(b"lock test"))
    }

    #[test]
    fn lock_path_layout() {
        let (dir, locks, digest) = setup();
        assert_eq!(
            locks.lock_path(&digest, 3),
            dir.path().join("locks").join(format!("{digest}_3"))
        );
    }

    #[test]
    fn acquire_is_exclusive_until_release() {
        let (_dir, locks, digest) = setup();
        assert!(locks.acquire(&digest, 0).unwrap());
        assert!(!locks.acquire(&digest, 0).unwrap());
        locks.release(&digest, 0).unwrap();
        assert!(locks.acquire(&digest, 0).unwrap());
    }

    #[test]
    fn exclusive_across_tables() {
        // Two tables on one root behave like two processes.
        let (dir, locks, digest) = setup();
        let other = BuildLocks::new(dir.path());
        assert!(locks.acquire(&digest, 0).unwrap());
        assert!(!other.acquire(&digest, 0).unwrap());
        assert!(other.held().is_empty());
    }

    #[test]
    fn depths_are_independent() {
        let (_dir, locks, digest) = setup();
        for depth in 0..=MAX_LOCK_DEPTH {
            assert!(locks.acquire(&digest, depth).unwrap());
        }
        assert_eq!(locks.held().len(), 10);
        assert!(!locks.acquire(&digest, 4).unwrap());
    }

    #[test]
    fn depth_out_of_range() {
        let (_dir, locks, digest) = setup();
        assert!(matches!(
            locks.acquire(&digest, 10),
            Err(CacheError::InvalidLockDepth { depth: 10, .. })
        ));
    }

    #[test]
    fn release_is_idempotent() {
        let (_dir, locks, digest) = setup();
        locks.release(&digest, 0).unwrap();
        assert!(locks.acquire(&digest, 0).unwrap());
        locks.release(&digest, 0).unwrap();
        locks.release(&digest, 0).unwrap();
        assert!(!locks.is_locked(&digest, 0).unwrap());
    }

    #[test]
    fn guard_releases_on_drop() {
        let (_dir, locks, digest) = setup();
        {
            let guard = locks.try_lock(&digest, 1).unwrap();
            assert!(guard.is_some());
            assert!(locks.try_lock(&digest, 1).unwrap().is_none());
        }
        assert!(!locks.is_locked(&digest, 1).unwrap());
    }

    #[test]
    fn wait_returns_after_release() {
        let (dir, locks, digest) = setup();
        assert!(locks.acquire(&digest, 0).unwrap());

        let root = dir.path().to_path_buf();
        let done = Arc::new(AtomicBool::new(false));
        let done_waiter = Arc::clone(&done);
        let waiter = std::thread::spawn(move || {
            let locks = BuildLocks::new(&root);
            locks.wait(&digest, 0).unwrap();
            done_waiter.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));
        locks.release(&digest, 0).unwrap();
        waiter.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_on_free_lock_returns_immediately() {
        let (_dir, locks, digest) = setup();
        locks.wait(&digest, 2).unwrap();
    }

    #[test]
    fn wait_timeout_leaves_foreign_lock() {
        let (dir, locks, digest) = setup();
        assert!(locks.acquire(&digest, 0).unwrap());
        let other = BuildLocks::new(dir.path());
        let err = other
            .wait_timeout(&digest, 0, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, CacheError::LockTimeout { .. }));
        assert!(locks.is_locked(&digest, 0).unwrap());
    }

    #[test]
    fn release_all_and_drop_clean_up() {
        let (dir, locks, digest) = setup();
        let other_digest = Digest::of(b"other");
        assert!(locks.acquire(&digest, 0).unwrap());
        assert!(locks.acquire(&other_digest, 1).unwrap());
        assert_eq!(locks.release_all(), 2);
        assert!(locks.held().is_empty());

        assert!(locks.acquire(&digest, 0).unwrap());
        drop(locks);
        let fresh = BuildLocks::new(dir.path());
        assert!(!fresh.is_locked(&digest, 0).unwrap());
    }

    #[test]
    fn list_locks_reports_present_directories() {
        let (dir, locks, digest) = setup();
        assert!(list_locks(dir.path()).unwrap().is_empty());
        assert!(locks.acquire(&digest, 0).unwrap());
        assert!(locks.acquire(&digest, 1).unwrap());
        std::fs::create_dir_all(dir.path().join(LOCKS_DIR).join("junk")).unwrap();

        let found = list_locks(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|l| l.digest == digest));
        assert_eq!(found[0].depth, 0);
        assert_eq!(found[1].depth, 1);
    }
}
