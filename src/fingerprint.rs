//! Content fingerprinting.
//!
//! A [`Fingerprint`] is the SHA-256 digest of the ordered concatenation of every
//! content payload in a request. Order matters: the same images submitted in a
//! different order are a different request. Callers present items in upload order.
//!
//! Each payload is framed by its length (8 bytes, big-endian) before its bytes,
//! so moving a boundary between items changes the digest: `["AB", "C"]` and
//! `["A", "BC"]` are distinct requests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex length of a rendered fingerprint (256-bit digest).
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Opaque, fixed-length content identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }

    /// Short prefix used in log lines.
    pub fn short(&self) -> String {
        hex(&self.0[..8])
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != FINGERPRINT_HEX_LEN || !s.is_ascii() {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            out[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint: {}", s)))
    }
}

/// Fingerprint an ordered sequence of content buffers.
pub fn fingerprint<I, B>(contents: I) -> Fingerprint
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for buf in contents {
        let buf = buf.as_ref();
        hasher.update((buf.len() as u64).to_be_bytes());
        hasher.update(buf);
    }
    Fingerprint(hasher.finalize().into())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
