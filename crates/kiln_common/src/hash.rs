//! Deterministic content digests used as kernel cache keys.
//!
//! A [`Digest`] is eight 32-bit words: four independent polynomial hash lanes
//! over the Mersenne prime `2^31 - 1`, each stored as `(hash, base^len)`. Keeping
//! the length term makes digests composable: merging the digests of `a` and `b`
//! yields exactly the digest of `a ++ b`. The output depends only on the input
//! bytes, never on addresses, timestamps, or the host platform.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Modulus shared by every lane.
const MODULUS: u64 = (1 << 31) - 1;

/// Number of independent hash lanes.
const LANES: usize = 4;

/// Polynomial base per lane.
const BASES: [u64; LANES] = [0x1b87_3593, 0x2c1b_3c6d, 0x3a4f_1d29, 0x0b4c_7e5f];

/// Byte multiplier per lane, so that each lane sees a different byte image.
const MIXERS: [u64; LANES] = [0x1e35_a7bd, 0x2545_f491, 0x3c6e_f372, 0x14d3_b0a9];

/// Length in characters of a rendered digest.
pub const DIGEST_STR_LEN: usize = 64;

/// A fixed-width content digest (8 x 32-bit words).
///
/// Renders as 64 lowercase hex characters, which is safe to use as a single
/// path segment on every supported platform.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Digest([u32; 8]);

impl Digest {
    /// The digest of the empty byte sequence; the identity for [`merge_with`](Self::merge_with).
    pub const EMPTY: Digest = Digest([0, 1, 0, 1, 0, 1, 0, 1]);

    /// Hashes a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut words = [0u32; 8];
        for lane in 0..LANES {
            let mut h = 0u64;
            for &byte in data {
                h = (h * BASES[lane] + (u64::from(byte) + 1) * MIXERS[lane] % MODULUS) % MODULUS;
            }
            words[2 * lane] = h as u32;
            words[2 * lane + 1] = pow_mod(BASES[lane], data.len() as u64) as u32;
        }
        Self(words)
    }

    /// Combines two digests so that `Digest::of(a).merge_with(&Digest::of(b)) == Digest::of(a ++ b)`.
    ///
    /// The operation is associative and order-sensitive.
    pub fn merge_with(&self, other: &Digest) -> Digest {
        let mut words = [0u32; 8];
        for lane in 0..LANES {
            let (h_a, p_a) = (u64::from(self.0[2 * lane]), u64::from(self.0[2 * lane + 1]));
            let (h_b, p_b) = (u64::from(other.0[2 * lane]), u64::from(other.0[2 * lane + 1]));
            words[2 * lane] = ((h_a * p_b + h_b) % MODULUS) as u32;
            words[2 * lane + 1] = (p_a * p_b % MODULUS) as u32;
        }
        Digest(words)
    }

    /// Returns the raw words.
    pub fn words(&self) -> [u32; 8] {
        self.0
    }
}

fn pow_mod(mut base: u64, mut exp: u64) -> u64 {
    let mut acc = 1u64;
    base %= MODULUS;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * base % MODULUS;
        }
        base = base * base % MODULUS;
        exp >>= 1;
    }
    acc
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in &self.0 {
            write!(f, "{word:08x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({:08x}{:08x}..)", self.0[0], self.0[2])
    }
}

/// Error returned when parsing a rendered digest fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest '{0}': expected {DIGEST_STR_LEN} hex characters")]
pub struct ParseDigestError(pub String);

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_STR_LEN || !s.is_ascii() {
            return Err(ParseDigestError(s.to_string()));
        }
        let mut words = [0u32; 8];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u32::from_str_radix(&s[i * 8..i * 8 + 8], 16)
                .map_err(|_| ParseDigestError(s.to_string()))?;
        }
        Ok(Digest(words))
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}

impl TryFrom<String> for Digest {
    type Error = ParseDigestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Types with a platform-stable byte image that can be fed to the hasher.
///
/// Numbers are written little-endian, `usize`/`isize` widened to 64 bits, and
/// strings as their UTF-8 bytes.
pub trait HashBytes {
    /// Appends this value's byte image to `out`.
    fn write_bytes(&self, out: &mut Vec<u8>);
}

macro_rules! impl_hash_bytes_le {
    ($($t:ty),*) => {
        $(impl HashBytes for $t {
            fn write_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        })*
    };
}

impl_hash_bytes_le!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl HashBytes for usize {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        (*self as u64).write_bytes(out);
    }
}

impl HashBytes for isize {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        (*self as i64).write_bytes(out);
    }
}

impl HashBytes for bool {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl HashBytes for str {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl HashBytes for String {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.as_str().write_bytes(out);
    }
}

impl<T: HashBytes> HashBytes for [T] {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        for item in self {
            item.write_bytes(out);
        }
    }
}

impl<T: HashBytes> HashBytes for Vec<T> {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.as_slice().write_bytes(out);
    }
}

impl<T: HashBytes + ?Sized> HashBytes for &T {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        (**self).write_bytes(out);
    }
}

/// Hashes `data` followed by `salt`.
pub fn hash_salted(data: &[u8], salt: &[u8]) -> Digest {
    Digest::of(data).merge_with(&Digest::of(salt))
}

/// Hashes a string followed by `salt`.
pub fn hash_str(s: &str, salt: &str) -> Digest {
    hash_salted(s.as_bytes(), salt.as_bytes())
}

/// Hashes the byte image of a typed value followed by `salt`.
pub fn hash_value<T: HashBytes + ?Sized>(value: &T, salt: &[u8]) -> Digest {
    let mut bytes = Vec::new();
    value.write_bytes(&mut bytes);
    hash_salted(&bytes, salt)
}
