//! Multi-threaded host execution through OpenMP.

use kiln_config::ResolvedDevice;

use crate::host::{host_backend, HostCore};
use crate::identity::{DeviceId, DeviceIdentity};
use crate::stream::StreamTable;
use crate::toolchain::{compiler_vendor, define_flag, join_flags, openmp_flag};

/// Define carrying the worker thread hint into kernel source.
pub const THREADS_DEFINE: &str = "KILN_THREADS";

/// Compiles kernels with OpenMP enabled; kernels parallelize internally.
#[derive(Debug)]
pub struct ThreadedDevice {
    core: HostCore,
    threads: Option<usize>,
}

impl ThreadedDevice {
    /// Opens a threaded device. The vendor's OpenMP flag and the thread hint
    /// become part of the effective compiler flags.
    pub fn open(resolved: &ResolvedDevice) -> Self {
        let id = DeviceId::next();
        let flags = effective_flags(resolved);
        let identity = DeviceIdentity::new(resolved, flags);
        Self {
            core: HostCore::new(id, identity, StreamTable::single(id)),
            threads: resolved.threads,
        }
    }

    /// Worker thread hint, if one was configured.
    pub fn threads(&self) -> Option<usize> {
        self.threads
    }
}

fn effective_flags(resolved: &ResolvedDevice) -> String {
    let vendor = compiler_vendor(&resolved.compiler);
    let mut extra = vec![openmp_flag(vendor).to_string()];
    if let Some(n) = resolved.threads {
        extra.push(define_flag(vendor, THREADS_DEFINE, &n.to_string()));
    }
    join_flags(&resolved.compiler_flags, &extra)
}

host_backend!(ThreadedDevice);
