//! Integrity checksums for cached binary artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit XXH3 checksum of an artifact's bytes.
///
/// Recorded next to a compiled binary when it is published to the cache and
/// re-verified before the binary is loaded. Unlike [`Digest`](crate::Digest)
/// it is not part of any cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Computes the checksum of a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
