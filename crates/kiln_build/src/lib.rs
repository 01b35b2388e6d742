//! Cached kernel builds.
//!
//! [`BuildPipeline::build_kernel`] turns a kernel source file into a loaded
//! [`Kernel`](kiln_device::Kernel), translating and compiling at most once per
//! unique combination of source, flags, and device identity across every
//! process sharing the cache root.

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod manifest;
pub mod pipeline;

pub use context::BuildContext;
pub use error::BuildError;
pub use manifest::EntryManifest;
pub use pipeline::{build_kernel_from_binary_with, BuildPipeline};
