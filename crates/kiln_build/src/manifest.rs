//! The per-entry manifest recording translation metadata.

use std::collections::BTreeMap;

use kiln_translate::FunctionInfo;
use serde::{Deserialize, Serialize};

/// Metadata written next to the translated source of a cache entry.
///
/// Cache hits read kernel metadata from here instead of re-running the
/// translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryManifest {
    /// Version of the translator that produced the entry.
    pub translator_version: String,
    /// Raw source the entry was built from, for display.
    pub source_path: String,
    /// Metadata for every kernel in the source.
    pub functions: BTreeMap<String, FunctionInfo>,
}

impl EntryManifest {
    /// Serializes the manifest as pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Parses a manifest.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
