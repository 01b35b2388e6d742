//! Kernel build orchestration.
//!
//! A build hashes the device identity, build flags, translator version, and
//! raw source into a digest, then fills the cache entry for that digest in
//! two locked tiers:
//!
//! 1. translation (lock depth 0): translated source plus a manifest of
//!    per-function metadata; the source file is published last and marks the
//!    entry as translated
//! 2. compilation (lock depth 1): the native binary and its checksum
//!
//! Each tier follows the same protocol: check the cache, try to take the
//! lock, re-check under the lock, produce, publish, release. A builder that
//! loses the race waits for the lock to disappear and re-checks; if the
//! holder failed and left nothing behind, the waiter tries again itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cache::{
    read_file, ArtifactKind, BuildLocks, CacheError, CacheStore, COMPILATION_DEPTH,
    TRANSLATION_DEPTH,
};
use kiln_common::{compress_path, Digest, Language, Salt};
use kiln_device::{DeviceBackend, DeviceError, Kernel};
use kiln_translate::{
    BuildFlags, FunctionInfo, KernelSourceTranslator, TranslateError, TranslationRequest,
};
use log::debug;

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::manifest::EntryManifest;

/// Builds kernels through the shared cache.
///
/// Runs entirely on the caller's thread. Any number of pipelines, in any
/// number of processes, may share one cache root.
pub struct BuildPipeline {
    translator: Arc<dyn KernelSourceTranslator>,
    store: CacheStore,
    locks: BuildLocks,
    lock_timeout: Option<std::time::Duration>,
}

impl BuildPipeline {
    /// Creates a pipeline over `ctx.cache_root` using `translator`.
    pub fn new(ctx: &BuildContext, translator: Arc<dyn KernelSourceTranslator>) -> Self {
        let store = CacheStore::new(&ctx.cache_root, translator.source_extension());
        Self {
            translator,
            store,
            locks: BuildLocks::new(&ctx.cache_root),
            lock_timeout: ctx.lock_timeout,
        }
    }

    /// The cache store this pipeline writes to.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The lock table of this pipeline.
    pub fn locks(&self) -> &BuildLocks {
        &self.locks
    }

    /// The cache-key input for building `source` on `backend` with `flags`.
    ///
    /// Component order: identity salt, flags salt, translator version,
    /// compiler environment script, compiler, compiler flags, vendor hint,
    /// source bytes. Empty optional components are left out.
    ///
    /// Device settings are free of `|` once resolved, but the source is not
    /// escaped: a source that starts with `<hint>|` can collide with the same
    /// source built under that vendor hint.
    pub fn salt_for(&self, source: &[u8], flags: &BuildFlags, backend: &dyn DeviceBackend) -> Salt {
        let identity = backend.identity();
        Salt::new()
            .component(backend.identity_salt())
            .optional(flags.salt())
            .component(self.translator.version())
            .optional(&identity.compiler_env_script)
            .component(&identity.compiler)
            .component(&identity.compiler_flags)
            .optional(&identity.vendor_hint)
            .component(source)
    }

    /// The cache digest for building the file at `source_path`.
    pub fn digest_for(
        &self,
        source_path: &Path,
        flags: &BuildFlags,
        backend: &dyn DeviceBackend,
    ) -> Result<Digest, BuildError> {
        let raw = read_file(source_path)?;
        Ok(self.salt_for(&raw, flags, backend).digest())
    }

    /// Builds `function` from the kernel file at `source_path` for `backend`.
    ///
    /// Translation and compilation each run at most once per digest across
    /// every builder sharing the cache root; other builders wait and reuse
    /// the result.
    pub fn build_kernel(
        &self,
        source_path: &Path,
        function: &str,
        flags: &BuildFlags,
        backend: &mut dyn DeviceBackend,
    ) -> Result<Kernel, BuildError> {
        if !backend.is_open() {
            return Err(BuildError::Device(DeviceError::Freed));
        }
        let raw = read_file(source_path)?;
        let digest = self.salt_for(&raw, flags, &*backend).digest();
        debug!(
            "building '{function}' from {} as {digest}",
            source_path.display()
        );

        let job = Job {
            source_path,
            function,
            flags,
            digest,
        };
        self.ensure_translated(&job, &raw, &*backend)?;
        let binary = self.ensure_compiled(&job, backend)?;

        let manifest = self.read_manifest(&digest)?;
        let info = manifest
            .functions
            .get(function)
            .ok_or_else(|| BuildError::NotFound {
                function: function.to_string(),
                source_path: source_path.to_path_buf(),
            })?;

        let loaded = backend.load_binary(&binary, function, info)?;
        Ok(Kernel::new(backend.id(), function, &binary, loaded))
    }

    /// Loads `function` from an existing binary, skipping hashing and locking.
    ///
    /// Kernel metadata is read from the `manifest.json` next to the binary,
    /// which is where cache entries keep it. The caller is responsible for
    /// the binary matching `backend`.
    pub fn build_kernel_from_binary(
        &self,
        binary: &Path,
        function: &str,
        backend: &mut dyn DeviceBackend,
    ) -> Result<Kernel, BuildError> {
        let manifest_path = binary
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(kiln_cache::store::MANIFEST_FILE);
        let manifest = parse_manifest(&manifest_path, &read_file(&manifest_path)?)?;
        let info = manifest
            .functions
            .get(function)
            .ok_or_else(|| BuildError::NotFound {
                function: function.to_string(),
                source_path: binary.to_path_buf(),
            })?;
        build_kernel_from_binary_with(binary, function, info, backend)
    }

    fn ensure_translated(
        &self,
        job: &Job<'_>,
        raw: &[u8],
        backend: &dyn DeviceBackend,
    ) -> Result<(), BuildError> {
        loop {
            if self.store.contains(&job.digest, ArtifactKind::Source)? {
                debug!("translation cached for {}", job.digest);
                return Ok(());
            }
            let Some(guard) = self.locks.try_lock(&job.digest, TRANSLATION_DEPTH)? else {
                self.wait(&job.digest, TRANSLATION_DEPTH)?;
                continue;
            };
            // Another builder may have finished between the check and the lock.
            if !self.store.contains(&job.digest, ArtifactKind::Source)? {
                self.translate(job, raw, backend)?;
            }
            guard.release()?;
            return Ok(());
        }
    }

    fn translate(
        &self,
        job: &Job<'_>,
        raw: &[u8],
        backend: &dyn DeviceBackend,
    ) -> Result<(), BuildError> {
        let text = std::str::from_utf8(raw).map_err(|e| {
            job.translation_error(TranslateError::Malformed {
                source_path: job.source_path.to_path_buf(),
                line: raw[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1,
                reason: "source is not valid UTF-8".to_string(),
            })
        })?;
        let request = TranslationRequest {
            source: text,
            source_path: job.source_path,
            mode: backend.kind(),
            language: Language::from_path(job.source_path),
            function: job.function,
            flags: job.flags,
        };
        let translation = self
            .translator
            .translate(&request)
            .map_err(|e| job.translation_error(e))?;

        let manifest = EntryManifest {
            translator_version: self.translator.version().to_string(),
            source_path: job.source_path.display().to_string(),
            functions: translation.functions,
        };
        let manifest_json = manifest.to_json().map_err(|e| {
            CacheError::Corrupt {
                path: self.store.artifact_path(&job.digest, ArtifactKind::Manifest),
                reason: e.to_string(),
            }
        })?;
        self.store
            .put(&job.digest, ArtifactKind::Manifest, &manifest_json)?;
        let source = self
            .store
            .put(&job.digest, ArtifactKind::Source, translation.source.as_bytes())?;
        debug!(
            "translated {} -> {}",
            job.source_path.display(),
            compress_path(&source, self.store.root())
        );
        Ok(())
    }

    fn ensure_compiled(
        &self,
        job: &Job<'_>,
        backend: &mut dyn DeviceBackend,
    ) -> Result<PathBuf, BuildError> {
        loop {
            if let Some(binary) = self.store.verified_binary(&job.digest)? {
                debug!("binary cached for {}", job.digest);
                return Ok(binary);
            }
            let Some(guard) = self.locks.try_lock(&job.digest, COMPILATION_DEPTH)? else {
                self.wait(&job.digest, COMPILATION_DEPTH)?;
                continue;
            };
            if let Some(binary) = self.store.verified_binary(&job.digest)? {
                guard.release()?;
                return Ok(binary);
            }

            let source = self.store.artifact_path(&job.digest, ArtifactKind::Source);
            let flags = backend.identity().compiler_flags.clone();
            let temp = self.store.reserve(&job.digest, ArtifactKind::Binary)?;
            backend
                .compile(&source, &temp)
                .map_err(|e| job.compile_error(e, flags))?;
            let binary = self.store.publish(&job.digest, ArtifactKind::Binary, temp)?;
            guard.release()?;
            return Ok(binary);
        }
    }

    fn wait(&self, digest: &Digest, depth: u8) -> Result<(), BuildError> {
        debug!("waiting for lock {digest}_{depth}");
        match self.lock_timeout {
            Some(timeout) => self.locks.wait_timeout(digest, depth, timeout)?,
            None => self.locks.wait(digest, depth)?,
        }
        Ok(())
    }

    fn read_manifest(&self, digest: &Digest) -> Result<EntryManifest, BuildError> {
        let path = self.store.artifact_path(digest, ArtifactKind::Manifest);
        let bytes = self
            .store
            .get(digest, ArtifactKind::Manifest)?
            .ok_or_else(|| CacheError::Corrupt {
                path: path.clone(),
                reason: "entry has translated source but no manifest".to_string(),
            })?;
        parse_manifest(&path, &bytes)
    }
}

/// Loads `function` from `binary` with explicitly supplied metadata.
pub fn build_kernel_from_binary_with(
    binary: &Path,
    function: &str,
    info: &FunctionInfo,
    backend: &mut dyn DeviceBackend,
) -> Result<Kernel, BuildError> {
    debug!("loading '{function}' from prebuilt {}", binary.display());
    let loaded = backend.load_binary(binary, function, info)?;
    Ok(Kernel::new(backend.id(), function, binary, loaded))
}

fn parse_manifest(path: &Path, bytes: &[u8]) -> Result<EntryManifest, BuildError> {
    EntryManifest::from_json(bytes).map_err(|e| {
        BuildError::CacheIo(CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

struct Job<'a> {
    source_path: &'a Path,
    function: &'a str,
    flags: &'a BuildFlags,
    digest: Digest,
}

impl Job<'_> {
    fn translation_error(&self, source: TranslateError) -> BuildError {
        BuildError::Translation {
            source_path: self.source_path.to_path_buf(),
            function: self.function.to_string(),
            source,
        }
    }

    fn compile_error(&self, err: DeviceError, flags: String) -> BuildError {
        match err {
            DeviceError::Compile { diagnostics, .. } => BuildError::Compile {
                source_path: self.source_path.to_path_buf(),
                function: self.function.to_string(),
                flags,
                diagnostics,
            },
            other => other.into(),
        }
    }
}
