//! The closed set of device variants.

use std::path::Path;
use std::time::Duration;

use kiln_config::{resolve_device, BackendKind, DeviceConfig, EnvSource, ResolvedDevice};
use kiln_translate::FunctionInfo;

use crate::accelerator::AcceleratorDevice;
use crate::backend::DeviceBackend;
use crate::error::DeviceError;
use crate::identity::{DeviceId, DeviceIdentity};
use crate::kernel::{Kernel, LoadedKernel};
use crate::memory::Memory;
use crate::serial::SerialDevice;
use crate::stream::{Stream, StreamTag};
use crate::threaded::ThreadedDevice;

/// Any device kiln can open.
#[derive(Debug)]
pub enum Device {
    /// Synchronous host execution.
    Serial(SerialDevice),
    /// OpenMP host execution.
    Threaded(ThreadedDevice),
    /// Accelerator-style execution with explicit streams.
    Accelerator(AcceleratorDevice),
}

impl Device {
    /// Opens the variant named by `resolved.backend`.
    pub fn open(resolved: &ResolvedDevice) -> Self {
        match resolved.backend {
            BackendKind::Serial => Device::Serial(SerialDevice::open(resolved)),
            BackendKind::Threaded => Device::Threaded(ThreadedDevice::open(resolved)),
            BackendKind::Accelerator => Device::Accelerator(AcceleratorDevice::open(resolved)),
        }
    }

    /// Resolves `config` against `env` and opens the result.
    ///
    /// Unset fields fall back to the environment, then to platform defaults.
    pub fn open_with(config: &DeviceConfig, env: &dyn EnvSource) -> Result<Self, DeviceError> {
        let resolved = resolve_device(config, env)?;
        Ok(Self::open(&resolved))
    }
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $body:expr) => {
        match $self {
            Device::Serial($d) => $body,
            Device::Threaded($d) => $body,
            Device::Accelerator($d) => $body,
        }
    };
}

impl DeviceBackend for Device {
    fn id(&self) -> DeviceId {
        dispatch!(self, d => d.id())
    }

    fn identity(&self) -> &DeviceIdentity {
        dispatch!(self, d => d.identity())
    }

    fn identity_salt(&self) -> String {
        dispatch!(self, d => d.identity_salt())
    }

    fn is_open(&self) -> bool {
        dispatch!(self, d => d.is_open())
    }

    fn compile(&mut self, source: &Path, output: &Path) -> Result<(), DeviceError> {
        dispatch!(self, d => d.compile(source, output))
    }

    fn load_binary(
        &mut self,
        path: &Path,
        function: &str,
        info: &FunctionInfo,
    ) -> Result<LoadedKernel, DeviceError> {
        dispatch!(self, d => d.load_binary(path, function, info))
    }

    fn free_kernel(&mut self, kernel: Kernel) -> Result<(), DeviceError> {
        dispatch!(self, d => d.free_kernel(kernel))
    }

    fn allocate(&mut self, bytes: usize, src: Option<&[u8]>) -> Result<Memory, DeviceError> {
        dispatch!(self, d => d.allocate(bytes, src))
    }

    fn mapped_alloc(&mut self, bytes: usize, src: Option<&[u8]>) -> Result<Memory, DeviceError> {
        dispatch!(self, d => d.mapped_alloc(bytes, src))
    }

    unsafe fn wrap_memory(
        &mut self,
        handle: *mut u8,
        bytes: usize,
    ) -> Result<Memory, DeviceError> {
        dispatch!(self, d => d.wrap_memory(handle, bytes))
    }

    fn free_memory(&mut self, memory: Memory) -> Result<(), DeviceError> {
        dispatch!(self, d => d.free_memory(memory))
    }

    fn bytes_allocated(&self) -> usize {
        dispatch!(self, d => d.bytes_allocated())
    }

    fn create_stream(&mut self) -> Result<Stream, DeviceError> {
        dispatch!(self, d => d.create_stream())
    }

    fn free_stream(&mut self, stream: Stream) -> Result<(), DeviceError> {
        dispatch!(self, d => d.free_stream(stream))
    }

    fn current_stream(&self) -> Result<Stream, DeviceError> {
        dispatch!(self, d => d.current_stream())
    }

    fn set_stream(&mut self, stream: &Stream) -> Result<(), DeviceError> {
        dispatch!(self, d => d.set_stream(stream))
    }

    fn tag_stream(&mut self) -> Result<StreamTag, DeviceError> {
        dispatch!(self, d => d.tag_stream())
    }

    fn wait_for(&mut self, tag: &StreamTag) -> Result<(), DeviceError> {
        dispatch!(self, d => d.wait_for(tag))
    }

    fn time_between(&self, start: &StreamTag, end: &StreamTag) -> Result<Duration, DeviceError> {
        dispatch!(self, d => d.time_between(start, end))
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        dispatch!(self, d => d.flush())
    }

    fn finish(&mut self) -> Result<(), DeviceError> {
        dispatch!(self, d => d.finish())
    }

    fn free(&mut self) {
        dispatch!(self, d => d.free())
    }
}
