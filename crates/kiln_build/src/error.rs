//! The error taxonomy surfaced by kernel builds.

use std::path::PathBuf;
use std::time::Duration;

use kiln_cache::CacheError;
use kiln_config::ConfigError;
use kiln_device::DeviceError;
use kiln_translate::TranslateError;

/// Errors returned by [`BuildPipeline`](crate::BuildPipeline).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Compiler, flags, or cache root could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The translator rejected the kernel source.
    #[error("translating '{function}' from {source_path} failed: {source}")]
    Translation {
        /// Raw kernel source.
        source_path: PathBuf,
        /// Requested kernel.
        function: String,
        /// What the translator reported.
        source: TranslateError,
    },

    /// The native toolchain rejected the translated source.
    #[error("compiling '{function}' from {source_path} with `{flags}` failed:\n{diagnostics}")]
    Compile {
        /// Raw kernel source.
        source_path: PathBuf,
        /// Requested kernel.
        function: String,
        /// Effective compiler flags.
        flags: String,
        /// The toolchain's output.
        diagnostics: String,
    },

    /// A cache file could not be read, written, or verified.
    #[error(transparent)]
    CacheIo(CacheError),

    /// A bounded lock wait expired.
    #[error("timed out after {waited:?} waiting for {lock}")]
    LockTimeout {
        /// The lock directory that stayed present.
        lock: PathBuf,
        /// How long the build waited.
        waited: Duration,
    },

    /// The cache entry has no metadata for the requested kernel.
    #[error("kernel '{function}' not found in {source_path}")]
    NotFound {
        /// Requested kernel.
        function: String,
        /// Raw kernel source.
        source_path: PathBuf,
    },

    /// The device failed outside compilation.
    #[error("device error: {0}")]
    Device(DeviceError),
}

impl From<CacheError> for BuildError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::LockTimeout { lock, waited } => BuildError::LockTimeout { lock, waited },
            other => BuildError::CacheIo(other),
        }
    }
}

impl From<DeviceError> for BuildError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Config(c) => BuildError::Configuration(c),
            other => BuildError::Device(other),
        }
    }
}
