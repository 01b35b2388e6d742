//! Per-build kernel flags: preprocessor defines and a free-form header.

use std::collections::BTreeMap;

/// Flags applied to one kernel build.
///
/// The rendered prelude is both prepended to the translated source and used
/// verbatim as the flags' salt, so two flag sets share a cache entry exactly
/// when they produce the same prelude.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFlags {
    defines: BTreeMap<String, String>,
    header: String,
}

impl BuildFlags {
    /// Creates an empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a preprocessor define.
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    /// Appends raw text to the header placed before the kernel source.
    pub fn header(mut self, text: &str) -> Self {
        self.header.push_str(text);
        if !text.ends_with('\n') {
            self.header.push('\n');
        }
        self
    }

    /// The defines, sorted by name.
    pub fn defines(&self) -> &BTreeMap<String, String> {
        &self.defines
    }

    /// Renders the text prepended to the translated source.
    pub fn prelude(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.defines {
            out.push_str("#define ");
            out.push_str(name);
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push_str(&self.header);
        out
    }

    /// The cache-key contribution of these flags; empty when no flags are set.
    pub fn salt(&self) -> String {
        self.prelude()
    }

    /// Returns `true` if no defines or header are set.
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty() && self.header.is_empty()
    }
}
