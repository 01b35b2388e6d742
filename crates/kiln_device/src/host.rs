//! State shared by the host-executed device variants.
//!
//! Each variant wraps a [`HostCore`] and differs only in how it builds its
//! identity and stream table; [`host_backend!`] forwards the capability
//! contract to the core.

use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use kiln_translate::FunctionInfo;
use log::debug;

use crate::error::DeviceError;
use crate::identity::{DeviceId, DeviceIdentity};
use crate::kernel::{Kernel, LoadedKernel, NativeEntry};
use crate::memory::Memory;
use crate::stream::{Stream, StreamTable, StreamTag};
use crate::toolchain;

#[derive(Debug)]
pub(crate) struct HostCore {
    id: DeviceId,
    identity: DeviceIdentity,
    open: bool,
    bytes_allocated: usize,
    streams: StreamTable,
}

impl HostCore {
    pub(crate) fn new(id: DeviceId, identity: DeviceIdentity, streams: StreamTable) -> Self {
        debug!("opened device {}: {}", id.get(), identity.describe());
        Self {
            id,
            identity,
            open: true,
            bytes_allocated: 0,
            streams,
        }
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::Freed)
        }
    }

    pub(crate) fn id(&self) -> DeviceId {
        self.id
    }

    pub(crate) fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn compile(&mut self, source: &Path, output: &Path) -> Result<(), DeviceError> {
        self.ensure_open()?;
        toolchain::compile_shared_library(&self.identity, source, output)
    }

    pub(crate) fn load_binary(
        &mut self,
        path: &Path,
        _function: &str,
        info: &FunctionInfo,
    ) -> Result<LoadedKernel, DeviceError> {
        self.ensure_open()?;
        let entry = NativeEntry::load(path, &info.entry)?;
        Ok(LoadedKernel {
            entry: Arc::new(entry),
            args: info.args.clone(),
        })
    }

    pub(crate) fn free_kernel(&mut self, kernel: Kernel) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if kernel.device() != self.id {
            return Err(DeviceError::ForeignObject("kernel"));
        }
        Ok(())
    }

    fn alloc(
        &mut self,
        bytes: usize,
        src: Option<&[u8]>,
        mapped: bool,
    ) -> Result<Memory, DeviceError> {
        self.ensure_open()?;
        let total = self
            .bytes_allocated
            .checked_add(bytes)
            .ok_or(DeviceError::Allocation { bytes })?;
        let mut memory = Memory::owned(self.id, bytes, mapped)?;
        if let Some(src) = src {
            memory.copy_from(src, 0)?;
        }
        self.bytes_allocated = total;
        Ok(memory)
    }

    pub(crate) fn allocate(
        &mut self,
        bytes: usize,
        src: Option<&[u8]>,
    ) -> Result<Memory, DeviceError> {
        self.alloc(bytes, src, false)
    }

    pub(crate) fn mapped_alloc(
        &mut self,
        bytes: usize,
        src: Option<&[u8]>,
    ) -> Result<Memory, DeviceError> {
        self.alloc(bytes, src, true)
    }

    pub(crate) fn wrap_memory(
        &mut self,
        handle: *mut u8,
        bytes: usize,
    ) -> Result<Memory, DeviceError> {
        self.ensure_open()?;
        let handle = NonNull::new(handle).ok_or(DeviceError::NullHandle)?;
        Ok(Memory::wrapped(self.id, handle, bytes))
    }

    pub(crate) fn free_memory(&mut self, memory: Memory) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if memory.device() != self.id {
            return Err(DeviceError::ForeignObject("memory"));
        }
        if !memory.is_wrapper() {
            self.bytes_allocated = self.bytes_allocated.saturating_sub(memory.size());
        }
        // Dropping owned storage releases it; wrapped storage is only forgotten.
        drop(memory);
        Ok(())
    }

    pub(crate) fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub(crate) fn create_stream(&mut self) -> Result<Stream, DeviceError> {
        self.ensure_open()?;
        Ok(self.streams.create())
    }

    pub(crate) fn free_stream(&mut self, stream: Stream) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.streams.free(stream)
    }

    pub(crate) fn current_stream(&self) -> Result<Stream, DeviceError> {
        self.ensure_open()?;
        Ok(self.streams.current())
    }

    pub(crate) fn set_stream(&mut self, stream: &Stream) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.streams.set_current(stream)
    }

    pub(crate) fn tag_stream(&mut self) -> Result<StreamTag, DeviceError> {
        self.ensure_open()?;
        Ok(self.streams.tag())
    }

    pub(crate) fn wait_for(&mut self, tag: &StreamTag) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.streams.wait_for(tag)
    }

    pub(crate) fn time_between(
        &self,
        start: &StreamTag,
        end: &StreamTag,
    ) -> Result<Duration, DeviceError> {
        self.ensure_open()?;
        self.streams.time_between(start, end)
    }

    /// Kernels run to completion when launched, so there is never queued work.
    pub(crate) fn flush(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()
    }

    pub(crate) fn finish(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()
    }

    pub(crate) fn free(&mut self) {
        debug!("freeing device {}", self.id.get());
        self.open = false;
    }
}

/// Implements [`DeviceBackend`](crate::DeviceBackend) for a type with a
/// `core: HostCore` field.
macro_rules! host_backend {
    ($ty:ty) => {
        impl $crate::backend::DeviceBackend for $ty {
            fn id(&self) -> $crate::identity::DeviceId {
                self.core.id()
            }

            fn identity(&self) -> &$crate::identity::DeviceIdentity {
                self.core.identity()
            }

            fn is_open(&self) -> bool {
                self.core.is_open()
            }

            fn compile(
                &mut self,
                source: &::std::path::Path,
                output: &::std::path::Path,
            ) -> Result<(), $crate::error::DeviceError> {
                self.core.compile(source, output)
            }

            fn load_binary(
                &mut self,
                path: &::std::path::Path,
                function: &str,
                info: &::kiln_translate::FunctionInfo,
            ) -> Result<$crate::kernel::LoadedKernel, $crate::error::DeviceError> {
                self.core.load_binary(path, function, info)
            }

            fn free_kernel(
                &mut self,
                kernel: $crate::kernel::Kernel,
            ) -> Result<(), $crate::error::DeviceError> {
                self.core.free_kernel(kernel)
            }

            fn allocate(
                &mut self,
                bytes: usize,
                src: Option<&[u8]>,
            ) -> Result<$crate::memory::Memory, $crate::error::DeviceError> {
                self.core.allocate(bytes, src)
            }

            fn mapped_alloc(
                &mut self,
                bytes: usize,
                src: Option<&[u8]>,
            ) -> Result<$crate::memory::Memory, $crate::error::DeviceError> {
                self.core.mapped_alloc(bytes, src)
            }

            unsafe fn wrap_memory(
                &mut self,
                handle: *mut u8,
                bytes: usize,
            ) -> Result<$crate::memory::Memory, $crate::error::DeviceError> {
                self.core.wrap_memory(handle, bytes)
            }

            fn free_memory(
                &mut self,
                memory: $crate::memory::Memory,
            ) -> Result<(), $crate::error::DeviceError> {
                self.core.free_memory(memory)
            }

            fn bytes_allocated(&self) -> usize {
                self.core.bytes_allocated()
            }

            fn create_stream(
                &mut self,
            ) -> Result<$crate::stream::Stream, $crate::error::DeviceError> {
                self.core.create_stream()
            }

            fn free_stream(
                &mut self,
                stream: $crate::stream::Stream,
            ) -> Result<(), $crate::error::DeviceError> {
                self.core.free_stream(stream)
            }

            fn current_stream(
                &self,
            ) -> Result<$crate::stream::Stream, $crate::error::DeviceError> {
                self.core.current_stream()
            }

            fn set_stream(
                &mut self,
                stream: &$crate::stream::Stream,
            ) -> Result<(), $crate::error::DeviceError> {
                self.core.set_stream(stream)
            }

            fn tag_stream(
                &mut self,
            ) -> Result<$crate::stream::StreamTag, $crate::error::DeviceError> {
                self.core.tag_stream()
            }

            fn wait_for(
                &mut self,
                tag: &$crate::stream::StreamTag,
            ) -> Result<(), $crate::error::DeviceError> {
                self.core.wait_for(tag)
            }

            fn time_between(
                &self,
                start: &$crate::stream::StreamTag,
                end: &$crate::stream::StreamTag,
            ) -> Result<::std::time::Duration, $crate::error::DeviceError> {
                self.core.time_between(start, end)
            }

            fn flush(&mut self) -> Result<(), $crate::error::DeviceError> {
                self.core.flush()
            }

            fn finish(&mut self) -> Result<(), $crate::error::DeviceError> {
                self.core.finish()
            }

            fn free(&mut self) {
                self.core.free()
            }
        }
    };
}

pub(crate) use host_backend;
