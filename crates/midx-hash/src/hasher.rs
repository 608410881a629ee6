use crate::{HashError, ObjectId};

/// Streaming SHA-1 computation with collision detection.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through
/// the [`std::io::Write`] implementation, then finalised into an
/// [`ObjectId`]. Index trailers are the only digests this library computes,
/// and they are all 20 bytes.
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    pub fn new() -> Self {
        use digest::Digest;
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        self.inner.update(data);
    }

    /// Finalize and return the digest.
    ///
    /// Returns an error if SHA-1 collision detection fires.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        let mut bytes = [0u8; ObjectId::RAW_LEN];
        bytes.copy_from_slice(result.hash().as_slice());
        Ok(ObjectId::from_raw(bytes))
    }

    /// Convenience: hash data in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
