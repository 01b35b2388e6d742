//! The device capability contract.

use std::path::Path;
use std::time::Duration;

use kiln_config::BackendKind;
use kiln_translate::FunctionInfo;

use crate::error::DeviceError;
use crate::identity::{DeviceId, DeviceIdentity};
use crate::kernel::{Kernel, LoadedKernel};
use crate::memory::Memory;
use crate::stream::{Stream, StreamTag};

/// Operations every execution model provides.
///
/// A device is `Open` until [`free`](Self::free) is called; afterwards every
/// fallible operation returns [`DeviceError::Freed`]. Devices are not
/// internally synchronized: callers serialize access to one instance.
pub trait DeviceBackend {
    /// Process-unique id of this device.
    fn id(&self) -> DeviceId;

    /// Toolchain identity; every field contributes to cache keys.
    fn identity(&self) -> &DeviceIdentity;

    /// Execution model of this device.
    fn kind(&self) -> BackendKind {
        self.identity().kind
    }

    /// Leading cache-key component naming the execution model.
    fn identity_salt(&self) -> String {
        self.identity().kind.tag().to_string()
    }

    /// `false` once the device has been freed.
    fn is_open(&self) -> bool;

    /// Compiles translated source into a loadable binary at `output`.
    ///
    /// Fails with [`DeviceError::Compile`] carrying the toolchain's output.
    fn compile(&mut self, source: &Path, output: &Path) -> Result<(), DeviceError>;

    /// Compiles translated source and loads `function` from the result.
    fn compile_translated_source(
        &mut self,
        source: &Path,
        output: &Path,
        function: &str,
        info: &FunctionInfo,
    ) -> Result<LoadedKernel, DeviceError> {
        self.compile(source, output)?;
        self.load_binary(output, function, info)
    }

    /// Loads `function` from an existing binary without compiling.
    fn load_binary(
        &mut self,
        path: &Path,
        function: &str,
        info: &FunctionInfo,
    ) -> Result<LoadedKernel, DeviceError>;

    /// Releases a kernel created by this device.
    fn free_kernel(&mut self, kernel: Kernel) -> Result<(), DeviceError>;

    /// Allocates `bytes` bytes, copying `src` in synchronously when given.
    fn allocate(&mut self, bytes: usize, src: Option<&[u8]>) -> Result<Memory, DeviceError>;

    /// Allocates memory with a host-visible mapping.
    fn mapped_alloc(&mut self, bytes: usize, src: Option<&[u8]>) -> Result<Memory, DeviceError>;

    /// Wraps caller-owned memory. The device never releases it.
    ///
    /// # Safety
    /// `handle` must stay valid for reads and writes of `bytes` bytes for as
    /// long as the returned [`Memory`] is used.
    unsafe fn wrap_memory(&mut self, handle: *mut u8, bytes: usize)
        -> Result<Memory, DeviceError>;

    /// Frees memory created by this device. Wrapped memory is left untouched.
    fn free_memory(&mut self, memory: Memory) -> Result<(), DeviceError>;

    /// Bytes currently held by owned allocations.
    fn bytes_allocated(&self) -> usize;

    /// Creates a stream.
    fn create_stream(&mut self) -> Result<Stream, DeviceError>;

    /// Frees a stream.
    fn free_stream(&mut self, stream: Stream) -> Result<(), DeviceError>;

    /// The stream new work is queued on.
    fn current_stream(&self) -> Result<Stream, DeviceError>;

    /// Makes `stream` current.
    fn set_stream(&mut self, stream: &Stream) -> Result<(), DeviceError>;

    /// Records a tag on the current stream.
    fn tag_stream(&mut self) -> Result<StreamTag, DeviceError>;

    /// Blocks until the work before `tag` has completed.
    fn wait_for(&mut self, tag: &StreamTag) -> Result<(), DeviceError>;

    /// Time elapsed between two tags.
    fn time_between(&self, start: &StreamTag, end: &StreamTag) -> Result<Duration, DeviceError>;

    /// Submits queued work.
    fn flush(&mut self) -> Result<(), DeviceError>;

    /// Blocks until all queued work has completed.
    fn finish(&mut self) -> Result<(), DeviceError>;

    /// Frees the device. Must be called at most once.
    fn free(&mut self);
}
