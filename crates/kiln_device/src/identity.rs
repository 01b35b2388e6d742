//! Device identity: what makes binaries from two devices interchangeable.

use std::sync::atomic::{AtomicU64, Ordering};

use kiln_config::{BackendKind, ResolvedDevice};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle of an opened device.
///
/// Kernels, memory and streams record the id of the device that created
/// them instead of holding a reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// The toolchain identity of a device.
///
/// Every field contributes to cache keys, so binaries built for devices with
/// different identities never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Execution model.
    pub kind: BackendKind,
    /// Native compiler executable.
    pub compiler: String,
    /// Effective compiler flags, including any the backend adds itself.
    pub compiler_flags: String,
    /// Script sourced before compiling; empty when unused.
    pub compiler_env_script: String,
    /// Vendor hint; empty when none was given.
    pub vendor_hint: String,
}

impl DeviceIdentity {
    /// Builds an identity from resolved settings, using `compiler_flags` as the effective flags.
    pub fn new(resolved: &ResolvedDevice, compiler_flags: String) -> Self {
        Self {
            kind: resolved.backend,
            compiler: resolved.compiler.clone(),
            compiler_flags,
            compiler_env_script: resolved.compiler_env_script.clone(),
            vendor_hint: resolved.vendor_hint.clone(),
        }
    }

    /// Human-readable one-line description.
    pub fn describe(&self) -> String {
        let mut s = format!("{} [{} {}]", self.kind, self.compiler, self.compiler_flags);
        if !self.vendor_hint.is_empty() {
            s.push_str(&format!(" vendor={}", self.vendor_hint));
        }
        s
    }
}
