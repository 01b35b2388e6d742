//! Device backends: compiling, loading, and running kernels, plus the
//! memory and stream objects kernels operate on.
//!
//! [`DeviceBackend`] is the capability contract. [`Device`] is the closed set
//! of variants kiln ships: serial, threaded, and accelerator-style. Shared
//! toolchain logic lives in [`toolchain`] as free functions.

#![warn(missing_docs)]

mod accelerator;
mod backend;
mod device;
pub mod error;
mod host;
mod identity;
mod kernel;
mod memory;
mod serial;
mod stream;
mod threaded;
pub mod toolchain;

pub use accelerator::AcceleratorDevice;
pub use backend::DeviceBackend;
pub use device::Device;
pub use error::DeviceError;
pub use identity::{DeviceId, DeviceIdentity};
pub use kernel::{Kernel, KernelEntry, LaunchFn, LoadedKernel, NativeEntry};
pub use memory::Memory;
pub use serial::SerialDevice;
pub use stream::{Stream, StreamId, StreamTag};
pub use threaded::{ThreadedDevice, THREADS_DEFINE};
