use std::cmp::Ordering;
use std::fmt;

use crate::hex;
use crate::{HashError, ObjectId};

/// An abbreviated object identifier: the first `hex_len` nibbles of an OID.
///
/// Prefixes are what lookup operations accept; a full 40-nibble prefix is
/// an exact OID. The unmentioned trailing nibbles of `bytes` are zero.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OidPrefix {
    bytes: [u8; ObjectId::RAW_LEN],
    hex_len: usize,
}

impl OidPrefix {
    /// Parse a prefix from 1–40 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let mut bytes = [0u8; ObjectId::RAW_LEN];
        let hex_len = hex::decode_prefix(s, &mut bytes)?;
        Ok(Self { bytes, hex_len })
    }

    /// Abbreviate a full OID to its first `hex_len` nibbles.
    pub fn from_oid(oid: &ObjectId, hex_len: usize) -> Result<Self, HashError> {
        if hex_len == 0 || hex_len > ObjectId::HEX_LEN {
            return Err(HashError::InvalidPrefixLength { actual: hex_len });
        }
        let mut bytes = [0u8; ObjectId::RAW_LEN];
        let keep = hex_len.div_ceil(2);
        bytes[..keep].copy_from_slice(&oid.as_bytes()[..keep]);
        if hex_len % 2 == 1 {
            bytes[keep - 1] &= 0xf0;
        }
        Ok(Self { bytes, hex_len })
    }

    /// Build from raw prefix bytes plus a nibble count, as lookup callers
    /// that already hold binary data do.
    pub fn from_bytes(bytes: &[u8], hex_len: usize) -> Result<Self, HashError> {
        if hex_len == 0 || hex_len > ObjectId::HEX_LEN {
            return Err(HashError::InvalidPrefixLength { actual: hex_len });
        }
        let need = hex_len.div_ceil(2);
        if bytes.len() < need {
            return Err(HashError::InvalidDigestLength {
                expected: need,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; ObjectId::RAW_LEN];
        raw[..need].copy_from_slice(&bytes[..need]);
        if hex_len % 2 == 1 {
            raw[need - 1] &= 0xf0;
        }
        Ok(Self { bytes: raw, hex_len })
    }

    /// The full-width prefix of an exact OID.
    pub fn full(oid: &ObjectId) -> Self {
        let mut bytes = [0u8; ObjectId::RAW_LEN];
        bytes.copy_from_slice(oid.as_bytes());
        Self {
            bytes,
            hex_len: ObjectId::HEX_LEN,
        }
    }

    pub fn hex_len(&self) -> usize {
        self.hex_len
    }

    /// Whether this prefix names a complete OID.
    pub fn is_full(&self) -> bool {
        self.hex_len == ObjectId::HEX_LEN
    }

    /// Fan-out bucket of the prefix (zero-padded low nibble for odd
    /// lengths, so this is the *lowest* bucket the prefix can match).
    pub fn first_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// The zero-padded 20 raw bytes backing the prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Does `oid` agree with this prefix on all `hex_len` nibbles?
    pub fn matches(&self, oid: &ObjectId) -> bool {
        prefix_cmp(&self.bytes, oid.as_bytes(), self.hex_len) == Ordering::Equal
    }

    /// Three-way comparison against a full OID, considering only the first
    /// `hex_len` nibbles. Suits binary search over a sorted OID table.
    pub fn cmp_oid(&self, oid: &ObjectId) -> Ordering {
        prefix_cmp(&self.bytes, oid.as_bytes(), self.hex_len)
    }
}

fn prefix_cmp(prefix: &[u8], oid: &[u8], hex_len: usize) -> Ordering {
    let full_bytes = hex_len / 2;
    match prefix[..full_bytes].cmp(&oid[..full_bytes]) {
        Ordering::Equal if hex_len % 2 == 1 => {
            (prefix[full_bytes] >> 4).cmp(&(oid[full_bytes] >> 4))
        }
        ord => ord,
    }
}

impl fmt::Display for OidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.bytes);
        f.write_str(&hex[..self.hex_len])
    }
}

impl fmt::Debug for OidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OidPrefix({self})")
    }
}
