//! Filesystem-backed storage for kernel cache entries.
//!
//! Each entry lives in `<cache_root>/kernels/<digest>/` and holds:
//!
//! - `source.<ext>`: the translated kernel source
//! - `manifest.json`: per-function metadata written alongside the source
//! - `binary` (`binary.dll` on Windows): the compiled artifact
//! - `binary.xxh3`: checksum of the compiled artifact
//!
//! Every file is written to a temporary name in the entry directory and then
//! renamed into place, so a reader sees either nothing or the complete file.
//! Entries are never evicted by this crate.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use kiln_common::{Checksum, Digest};
use log::debug;
use tempfile::TempPath;

use crate::error::CacheError;

/// Subdirectory of the cache root holding kernel entries.
pub const KERNELS_DIR: &str = "kernels";

/// File stem of the translated source.
pub const SOURCE_STEM: &str = "source";

/// File name of the entry manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File extension of the binary checksum sidecar.
const CHECKSUM_EXT: &str = "xxh3";

/// The kinds of file stored in a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Translated kernel source.
    Source,
    /// Per-function metadata recorded at translation time.
    Manifest,
    /// Compiled, loadable binary.
    Binary,
}

/// Returns the platform file name of the compiled binary.
pub fn binary_file_name() -> &'static str {
    if cfg!(windows) {
        "binary.dll"
    } else {
        "binary"
    }
}

/// Content-addressed store of kernel cache entries.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    source_ext: String,
}

impl CacheStore {
    /// Creates a store rooted at `cache_root` whose translated sources use extension `source_ext`.
    pub fn new(cache_root: &Path, source_ext: &str) -> Self {
        Self {
            root: cache_root.to_path_buf(),
            source_ext: source_ext.trim_start_matches('.').to_string(),
        }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the entry for `digest`.
    pub fn entry_dir(&self, digest: &Digest) -> PathBuf {
        self.root.join(KERNELS_DIR).join(digest.to_string())
    }

    /// Path of one artifact of the entry for `digest`.
    pub fn artifact_path(&self, digest: &Digest, kind: ArtifactKind) -> PathBuf {
        let dir = self.entry_dir(digest);
        match kind {
            ArtifactKind::Source => dir.join(format!("{SOURCE_STEM}.{}", self.source_ext)),
            ArtifactKind::Manifest => dir.join(MANIFEST_FILE),
            ArtifactKind::Binary => dir.join(binary_file_name()),
        }
    }

    fn checksum_path(&self, digest: &Digest) -> PathBuf {
        self.entry_dir(digest)
            .join(format!("{}.{CHECKSUM_EXT}", binary_file_name()))
    }

    /// Returns `true` if the artifact exists.
    ///
    /// Any error other than "not found" is reported, never treated as absent.
    pub fn contains(&self, digest: &Digest, kind: ArtifactKind) -> Result<bool, CacheError> {
        let path = self.artifact_path(digest, kind);
        match std::fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Reads an artifact's bytes, or `None` if it has not been written.
    pub fn get(&self, digest: &Digest, kind: ArtifactKind) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.artifact_path(digest, kind);
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!("cache hit {}", path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Writes an artifact completely and moves it into place. Returns its path.
    ///
    /// Binaries also get their checksum recorded.
    pub fn put(&self, digest: &Digest, kind: ArtifactKind, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let dir = self.ensure_entry_dir(digest)?;
        let temp = write_temp(&dir, ".put", bytes)?;
        self.publish(digest, kind, temp)
    }

    /// Reserves a temporary path inside the entry directory.
    ///
    /// Producers such as a native compiler write there and then hand the path
    /// to [`publish`](Self::publish). The file is removed if the path is dropped
    /// without being published.
    pub fn reserve(&self, digest: &Digest, kind: ArtifactKind) -> Result<TempPath, CacheError> {
        let dir = self.ensure_entry_dir(digest)?;
        let prefix = match kind {
            ArtifactKind::Source => ".source",
            ArtifactKind::Manifest => ".manifest",
            ArtifactKind::Binary => ".binary",
        };
        let suffix = if kind == ArtifactKind::Binary && cfg!(windows) {
            ".dll"
        } else {
            ""
        };
        tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&dir)
            .map(|f| f.into_temp_path())
            .map_err(|e| CacheError::io(dir, e))
    }

    /// Moves a fully written temporary file into place as `kind`. Returns the final path.
    pub fn publish(&self, digest: &Digest, kind: ArtifactKind, temp: TempPath) -> Result<PathBuf, CacheError> {
        let target = self.artifact_path(digest, kind);
        if kind == ArtifactKind::Binary {
            let bytes = std::fs::read(&temp).map_err(|e| CacheError::io(temp.to_path_buf(), e))?;
            let checksum = Checksum::from_bytes(&bytes).to_string();
            let sidecar = self.checksum_path(digest);
            let dir = self.ensure_entry_dir(digest)?;
            write_temp(&dir, ".checksum", checksum.as_bytes())?
                .persist(&sidecar)
                .map_err(|e| CacheError::io(&sidecar, e.error))?;
        }
        temp.persist(&target)
            .map_err(|e| CacheError::io(&target, e.error))?;
        debug!("cache write {}", target.display());
        Ok(target)
    }

    /// Returns the binary path after checking it against its recorded checksum.
    ///
    /// A missing binary is `Ok(None)`; a binary that fails verification is an error.
    pub fn verified_binary(&self, digest: &Digest) -> Result<Option<PathBuf>, CacheError> {
        let path = self.artifact_path(digest, ArtifactKind::Binary);
        let Some(bytes) = self.get(digest, ArtifactKind::Binary)? else {
            return Ok(None);
        };
        let sidecar = self.checksum_path(digest);
        let expected = match std::fs::read_to_string(&sidecar) {
            Ok(s) => s.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::MissingChecksum { path });
            }
            Err(e) => return Err(CacheError::io(sidecar, e)),
        };
        let actual = Checksum::from_bytes(&bytes).to_string();
        if actual != expected {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected,
                actual,
            });
        }
        Ok(Some(path))
    }

    fn ensure_entry_dir(&self, digest: &Digest) -> Result<PathBuf, CacheError> {
        let dir = self.entry_dir(digest);
        // create_dir_all tolerates another process creating the same directories.
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(dir)
    }
}

/// Writes `bytes` to a fresh temporary file in `dir` and flushes it to disk.
fn write_temp(dir: &Path, prefix: &str, bytes: &[u8]) -> Result<TempPath, CacheError> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)
        .map_err(|e| CacheError::io(dir, e))?;
    file.write_all(bytes)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| CacheError::io(file.path(), e))?;
    Ok(file.into_temp_path())
}

/// Reads a file as bytes, exactly as stored.
pub fn read_file(path: &Path) -> Result<Vec<u8>, CacheError> {
    std::fs::read(path).map_err(|e| CacheError::io(path, e))
}
