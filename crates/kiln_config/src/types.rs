//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// The top-level configuration parsed from `kiln.toml`.
///
/// Every section is optional; unset values are filled in by
/// [`resolve_device`](crate::resolve_device) and
/// [`resolve_cache_root`](crate::resolve_cache_root).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct KilnConfig {
    /// Kernel cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Device backend settings used when opening a device.
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Kernel cache settings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding `kernels/` and `locks/`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Settings requested when opening a device backend.
///
/// Unset fields fall back to environment variables and then to a
/// per-platform default.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Execution model to open.
    #[serde(default)]
    pub backend: BackendKind,
    /// Native compiler executable.
    #[serde(default)]
    pub compiler: Option<String>,
    /// Flags passed to the native compiler.
    #[serde(default)]
    pub compiler_flags: Option<String>,
    /// Script sourced before the compiler runs (e.g. a toolchain environment setup).
    #[serde(default)]
    pub compiler_env_script: Option<String>,
    /// Free-form vendor hints that distinguish otherwise identical toolchains.
    #[serde(default)]
    pub vendor_hints: Vec<String>,
    /// Worker thread hint for the threaded backend.
    #[serde(default)]
    pub threads: Option<usize>,
}

/// The execution model a device backend implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Synchronous, single-threaded host execution.
    #[default]
    Serial,
    /// Host execution with kernels compiled for multithreading.
    Threaded,
    /// Accelerator-style execution with explicit streams and device memory.
    Accelerator,
}

impl BackendKind {
    /// The identity tag contributed to every cache key.
    pub fn tag(self) -> &'static str {
        match self {
            BackendKind::Serial => "Serial",
            BackendKind::Threaded => "Threaded",
            BackendKind::Accelerator => "Accelerator",
        }
    }

    /// All known backend kinds.
    pub fn all() -> [BackendKind; 3] {
        [
            BackendKind::Serial,
            BackendKind::Threaded,
            BackendKind::Accelerator,
        ]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(BackendKind::Serial),
            "threaded" | "openmp" => Ok(BackendKind::Threaded),
            "accelerator" => Ok(BackendKind::Accelerator),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}
