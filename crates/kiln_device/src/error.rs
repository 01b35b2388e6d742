//! Error types for device backends.

use std::path::PathBuf;

use crate::stream::StreamId;

/// Errors reported by a [`DeviceBackend`](crate::DeviceBackend).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The native toolchain rejected the translated source.
    #[error("compilation of {source_path} failed ({command}):\n{diagnostics}")]
    Compile {
        /// The translated source that was compiled.
        source_path: PathBuf,
        /// The command line that was run.
        command: String,
        /// Everything the toolchain printed.
        diagnostics: String,
    },

    /// The toolchain could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A compiled binary could not be loaded.
    #[error("failed to load {path}: {reason}")]
    Load {
        /// The binary path.
        path: PathBuf,
        /// The loader's message.
        reason: String,
    },

    /// The binary does not export the kernel's launch symbol.
    #[error("{path} has no symbol '{symbol}'")]
    MissingSymbol {
        /// The binary path.
        path: PathBuf,
        /// The symbol that was looked up.
        symbol: String,
    },

    /// The device has been freed.
    #[error("device has been freed")]
    Freed,

    /// The host could not provide the requested allocation.
    #[error("cannot allocate {bytes} bytes")]
    Allocation {
        /// Requested size in bytes.
        bytes: usize,
    },

    /// A null pointer was passed where external memory was expected.
    #[error("cannot wrap a null memory handle")]
    NullHandle,

    /// The object was created by a different device.
    #[error("{0} belongs to another device")]
    ForeignObject(&'static str),

    /// The stream does not exist on this device.
    #[error("unknown stream {0}")]
    UnknownStream(StreamId),

    /// A copy would go outside a memory allocation.
    #[error("copy of {len} bytes at offset {offset} exceeds allocation of {size} bytes")]
    OutOfBounds {
        /// Start offset of the copy.
        offset: usize,
        /// Number of bytes copied.
        len: usize,
        /// Size of the allocation.
        size: usize,
    },

    /// A kernel was launched with the wrong number of arguments.
    #[error("kernel '{function}' takes {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Kernel function name.
        function: String,
        /// Declared argument count.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },

    /// Device configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] kiln_config::ConfigError),
}
