//! Accelerator-style execution with explicit streams.
//!
//! Kernels are compiled with the configured toolchain and run on the host,
//! but the device keeps a table of real streams the way a queue-based
//! runtime does, so stream bookkeeping can be exercised end to end.

use kiln_config::ResolvedDevice;

use crate::host::{host_backend, HostCore};
use crate::identity::{DeviceId, DeviceIdentity};
use crate::stream::StreamTable;

/// A device with independently created streams.
#[derive(Debug)]
pub struct AcceleratorDevice {
    core: HostCore,
}

impl AcceleratorDevice {
    /// Opens an accelerator-style device.
    pub fn open(resolved: &ResolvedDevice) -> Self {
        let id = DeviceId::next();
        let identity = DeviceIdentity::new(resolved, resolved.compiler_flags.clone());
        Self {
            core: HostCore::new(id, identity, StreamTable::multi(id)),
        }
    }
}

host_backend!(AcceleratorDevice);
