//! Path helpers shared by the cache and the build pipeline.

use std::path::Path;

/// Source language of a kernel file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// C-family kernel source (the default).
    C,
    /// Fortran kernel source (`.ofl`).
    Fortran,
}

impl Language {
    /// Infers the language from a file path.
    pub fn from_path(path: &Path) -> Self {
        match file_extension(path) {
            Some("ofl") => Language::Fortran,
            _ => Language::C,
        }
    }

    /// Tag passed to the translator.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Fortran => "Fortran",
        }
    }
}

/// Returns the extension of `path` without the leading dot.
pub fn file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Shortens a path for display.
///
/// Paths inside `<cache_root>/kernels/` are shown relative to it; anything
/// else is shown as-is.
pub fn compress_path(path: &Path, cache_root: &Path) -> String {
    match path.strip_prefix(cache_root.join("kernels")) {
        Ok(rest) => rest.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
