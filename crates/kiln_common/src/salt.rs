//! Ordered salt composition for kernel cache keys.
//!
//! The salt is the literal input to the cache-key hash. Components are joined
//! with `|` in a fixed order; reordering them (or changing the separator)
//! invalidates every existing cache entry.

use crate::hash::Digest;

/// Byte placed between salt components.
pub const SEPARATOR: u8 = b'|';

/// Builder for the byte sequence whose digest becomes a cache key.
///
/// ```
/// use kiln_common::{Digest, Salt};
///
/// let salt = Salt::new()
///     .component("Serial")
///     .optional("")
///     .component("v3")
///     .component("g++")
///     .component("-g")
///     .component(b"kernel bytes");
/// assert_eq!(salt.as_bytes(), b"Serial|v3|g++|-g|kernel bytes");
/// assert_eq!(salt.digest(), Digest::of(b"Serial|v3|g++|-g|kernel bytes"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Salt {
    bytes: Vec<u8>,
    parts: usize,
}

impl Salt {
    /// Creates an empty salt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a component, even when it is empty.
    pub fn component(mut self, part: impl AsRef<[u8]>) -> Self {
        if self.parts > 0 {
            self.bytes.push(SEPARATOR);
        }
        self.bytes.extend_from_slice(part.as_ref());
        self.parts += 1;
        self
    }

    /// Appends a component only if it is non-empty.
    pub fn optional(self, part: impl AsRef<[u8]>) -> Self {
        if part.as_ref().is_empty() {
            self
        } else {
            self.component(part)
        }
    }

    /// Number of components appended so far.
    pub fn len(&self) -> usize {
        self.parts
    }

    /// Returns `true` if no component has been appended.
    pub fn is_empty(&self) -> bool {
        self.parts == 0
    }

    /// The salt bytes exactly as hashed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Digest of the salt bytes.
    pub fn digest(&self) -> Digest {
        Digest::of(&self.bytes)
    }
}
