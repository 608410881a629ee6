use std::fmt;
use std::str::FromStr;

use crate::hex;
use crate::HashError;

/// An object identifier — the 20-byte digest naming a stored object.
///
/// Ordering is lexicographic over the raw bytes, which matches the sort
/// order of every on-disk index format this library touches.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Digest width in bytes.
    pub const RAW_LEN: usize = 20;
    /// Digest width in hex nibbles.
    pub const HEX_LEN: usize = 40;

    /// The null OID (all zeros).
    pub const NULL: Self = Self([0u8; 20]);

    /// Create an ObjectId from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != Self::RAW_LEN {
            return Err(HashError::InvalidDigestLength {
                expected: Self::RAW_LEN,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; Self::RAW_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Create an ObjectId from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let mut raw = [0u8; Self::RAW_LEN];
        hex::decode_exact(s, &mut raw)?;
        Ok(Self(raw))
    }

    pub const fn from_raw(raw: [u8; 20]) -> Self {
        Self(raw)
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// First byte of the digest (fan-out table bucket).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Check if this is the null (all-zeros) OID.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
