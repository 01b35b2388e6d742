//! Synchronous host execution.

use kiln_config::ResolvedDevice;

use crate::host::{host_backend, HostCore};
use crate::identity::{DeviceId, DeviceIdentity};
use crate::stream::StreamTable;

/// Runs kernels on the calling thread. Stream operations are no-ops.
#[derive(Debug)]
pub struct SerialDevice {
    core: HostCore,
}

impl SerialDevice {
    /// Opens a serial device with the resolved toolchain settings.
    pub fn open(resolved: &ResolvedDevice) -> Self {
        let id = DeviceId::next();
        let identity = DeviceIdentity::new(resolved, resolved.compiler_flags.clone());
        Self {
            core: HostCore::new(id, identity, StreamTable::single(id)),
        }
    }
}

host_backend!(SerialDevice);
