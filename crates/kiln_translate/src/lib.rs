//! The kernel source translation contract.
//!
//! A translator rewrites raw kernel source into the dialect a backend can
//! compile and reports per-function metadata (argument layout and dialect).
//! The build pipeline only depends on [`KernelSourceTranslator`];
//! [`MarkerTranslator`] is the built-in implementation for C-family kernels.

#![warn(missing_docs)]

pub mod error;
pub mod flags;
pub mod marker;

use std::collections::BTreeMap;
use std::path::Path;

use kiln_common::Language;
use kiln_config::BackendKind;
use serde::{Deserialize, Serialize};

pub use error::TranslateError;
pub use flags::BuildFlags;
pub use marker::MarkerTranslator;

/// One translation job.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    /// Raw kernel source text.
    pub source: &'a str,
    /// Where the source came from, for diagnostics.
    pub source_path: &'a Path,
    /// Execution model the output targets.
    pub mode: BackendKind,
    /// Language of the raw source.
    pub language: Language,
    /// Kernel the caller intends to load; translation fails if it is absent.
    pub function: &'a str,
    /// Build flags to apply.
    pub flags: &'a BuildFlags,
}

/// Output of a successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// Translated source, ready for the native compiler.
    pub source: String,
    /// Metadata for every kernel found, keyed by function name.
    pub functions: BTreeMap<String, FunctionInfo>,
}

/// Metadata describing one translated kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Symbol to call when launching the kernel.
    pub entry: String,
    /// Target dialect the kernel was emitted in.
    pub dialect: String,
    /// Kernel arguments, in call order.
    pub args: Vec<ArgInfo>,
}

/// How one kernel argument is marshalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgInfo {
    /// Parameter name.
    pub name: String,
    /// C type of the parameter as written (arrays normalized to pointers).
    pub ty: String,
    /// Whether the argument is passed as a pointer or by value.
    pub kind: ArgKind,
}

/// Marshalling class of a kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    /// A pointer to memory; the launch slot holds the pointer itself.
    Pointer,
    /// A value; the launch slot points at the value.
    Scalar,
}

/// Rewrites raw kernel source into a backend-consumable dialect.
pub trait KernelSourceTranslator: Send + Sync {
    /// Version of the output format. Part of every cache key.
    fn version(&self) -> &str;

    /// Extension of translated source files, without the dot.
    fn source_extension(&self) -> &str {
        "c"
    }

    /// Translates `request.source`.
    ///
    /// Fails with [`TranslateError::MissingFunction`] when `request.function`
    /// is not one of the kernels in the source.
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<Translation, TranslateError>;
}
