//! Shared foundational types for the kiln kernel build cache.
//!
//! This crate provides the content digest used as a cache key, the ordered
//! salt builder that feeds it, artifact checksums, and small path helpers.

#![warn(missing_docs)]

pub mod checksum;
pub mod hash;
pub mod path;
pub mod salt;

pub use checksum::Checksum;
pub use hash::{hash_salted, hash_str, hash_value, Digest, HashBytes, ParseDigestError};
pub use path::{compress_path, file_extension, Language};
pub use salt::Salt;
