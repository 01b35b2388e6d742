//! Error types for kernel source translation.

use std::path::PathBuf;

/// Errors reported by a [`KernelSourceTranslator`](crate::KernelSourceTranslator).
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// The requested function is not a kernel in the source.
    #[error("could not find kernel '{function}' in {source_path}")]
    MissingFunction {
        /// The kernel source file.
        source_path: PathBuf,
        /// The requested function name.
        function: String,
    },

    /// The source could not be understood.
    #[error("{source_path}:{line}: {reason}")]
    Malformed {
        /// The kernel source file.
        source_path: PathBuf,
        /// 1-based line of the problem.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// The translator does not handle this source language.
    #[error("{source_path}: unsupported kernel language {language}")]
    UnsupportedLanguage {
        /// The kernel source file.
        source_path: PathBuf,
        /// The language tag.
        language: String,
    },
}
