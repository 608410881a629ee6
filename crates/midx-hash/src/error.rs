/// Errors produced by hash and OID operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("invalid OID prefix length {actual}: must be between 1 and 40 nibbles")]
    InvalidPrefixLength { actual: usize },

    #[error("fanout table is not monotonic at entry {index}")]
    NonMonotonicFanout { index: usize },

    #[error("SHA-1 collision detected")]
    Sha1Collision,
}
