//! Explicitly constructed build settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln_config::{resolve_cache_root, resolve_device, EnvSource, KilnConfig, ResolvedDevice};
use kiln_device::Device;

use crate::error::BuildError;

/// Everything a build needs from configuration and the environment.
///
/// Resolved once and passed by value; nothing in the pipeline reads the
/// environment on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Root of the shared kernel cache.
    pub cache_root: PathBuf,
    /// Settings used to open devices.
    pub device: ResolvedDevice,
    /// Upper bound on waiting for another builder's lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
}

impl BuildContext {
    /// Creates a context from already-resolved settings.
    pub fn new(cache_root: &Path, device: ResolvedDevice) -> Self {
        Self {
            cache_root: cache_root.to_path_buf(),
            device,
            lock_timeout: None,
        }
    }

    /// Resolves a loaded configuration against `env`.
    pub fn from_config(config: &KilnConfig, env: &dyn EnvSource) -> Result<Self, BuildError> {
        let cache_root = resolve_cache_root(&config.cache, env)?;
        let device = resolve_device(&config.device, env)?;
        Ok(Self::new(&cache_root, device))
    }

    /// Bounds lock waits; an expired wait fails with [`BuildError::LockTimeout`].
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Opens a device with this context's settings.
    pub fn open_device(&self) -> Device {
        Device::open(&self.device)
    }
}
