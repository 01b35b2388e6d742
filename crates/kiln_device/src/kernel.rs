//! Loaded kernels.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_translate::ArgInfo;
use libloading::{Library, Symbol};
use log::debug;

use crate::error::DeviceError;
use crate::identity::DeviceId;

/// Signature of the launch wrappers: one pointer slot per kernel argument.
pub type LaunchFn = unsafe extern "C" fn(*mut *mut c_void);

/// A callable kernel entry point.
pub trait KernelEntry: Send + Sync + fmt::Debug {
    /// Symbol name of the entry point.
    fn symbol(&self) -> &str;

    /// Calls the entry point.
    ///
    /// # Safety
    /// `args` must hold one valid slot per kernel argument, laid out as the
    /// argument metadata describes.
    unsafe fn call(&self, args: &mut [*mut c_void]);
}

/// An entry point resolved from a shared library.
pub struct NativeEntry {
    symbol: String,
    func: LaunchFn,
    // Keeps `func` valid.
    _library: Library,
}

impl NativeEntry {
    /// Loads `path` and resolves `symbol` in it.
    pub fn load(path: &Path, symbol: &str) -> Result<Self, DeviceError> {
        debug!("loading {} ({symbol})", path.display());
        // SAFETY: binaries are produced by the kiln toolchain from translated
        // source; their initializers have no side effects.
        let library = unsafe { Library::new(path) }.map_err(|e| DeviceError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // SAFETY: launch wrappers are emitted with the `LaunchFn` signature.
        let func = unsafe {
            let sym: Symbol<LaunchFn> =
                library
                    .get(symbol.as_bytes())
                    .map_err(|_| DeviceError::MissingSymbol {
                        path: path.to_path_buf(),
                        symbol: symbol.to_string(),
                    })?;
            *sym
        };
        Ok(Self {
            symbol: symbol.to_string(),
            func,
            _library: library,
        })
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

impl KernelEntry for NativeEntry {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    unsafe fn call(&self, args: &mut [*mut c_void]) {
        (self.func)(args.as_mut_ptr())
    }
}

/// What a device hands back after loading a binary: the callable entry and
/// how its arguments are marshalled.
#[derive(Debug, Clone)]
pub struct LoadedKernel {
    /// Callable entry point.
    pub entry: Arc<dyn KernelEntry>,
    /// Argument layout, in call order.
    pub args: Vec<ArgInfo>,
}

/// A compiled kernel bound to one device and one function.
///
/// The kernel records the id of its device; it neither owns the device nor
/// is owned by it.
#[derive(Debug, Clone)]
pub struct Kernel {
    device: DeviceId,
    function: String,
    binary: PathBuf,
    loaded: LoadedKernel,
}

impl Kernel {
    /// Binds a loaded entry to `device` under `function`.
    pub fn new(device: DeviceId, function: &str, binary: &Path, loaded: LoadedKernel) -> Self {
        Self {
            device,
            function: function.to_string(),
            binary: binary.to_path_buf(),
            loaded,
        }
    }

    /// The device this kernel was loaded into.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Kernel function name.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// The binary the kernel was loaded from.
    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    /// Argument layout, in call order.
    pub fn args(&self) -> &[ArgInfo] {
        &self.loaded.args
    }

    /// Symbol name of the entry point.
    pub fn entry_symbol(&self) -> &str {
        self.loaded.entry.symbol()
    }

    /// Runs the kernel to completion on the calling thread.
    ///
    /// Each slot holds a pointer: the memory itself for pointer arguments,
    /// the value's address for scalars.
    ///
    /// # Safety
    /// Every slot must be valid for the kernel's accesses during the call.
    pub unsafe fn launch(&self, args: &mut [*mut c_void]) -> Result<(), DeviceError> {
        if args.len() != self.loaded.args.len() {
            return Err(DeviceError::ArgumentCount {
                function: self.function.clone(),
                expected: self.loaded.args.len(),
                actual: args.len(),
            });
        }
        self.loaded.entry.call(args);
        Ok(())
    }
}
