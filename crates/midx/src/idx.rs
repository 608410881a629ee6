//! Pack index (v2) reading, reduced to what the MIDX writer needs: open a
//! `.idx` file and enumerate its `(OID, offset)` pairs in sorted order.
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte CRC32 values
//! Offsets: N × 4-byte offsets (high bit = 1 → use 64-bit table)
//! 64-bit:  M × 8-byte offsets (for packs > 2GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use memmap2::Mmap;
use midx_hash::{FanoutTable, ObjectId};
use midx_utils::reader::{u32_be_at, u64_be_at};

use crate::{MidxError, IDX_SIGNATURE, IDX_VERSION, LARGE_OFFSET_FLAG};

const TRAILER_SIZE: usize = 2 * ObjectId::RAW_LEN;

/// A memory-mapped pack index providing sorted (OID, offset) enumeration.
#[derive(Debug)]
pub struct PackIndex {
    data: Mmap,
    fanout: FanoutTable,
    num_objects: u32,
    /// Byte offset where sorted OIDs start.
    oid_offset: usize,
    /// Byte offset where 32-bit offsets start.
    offset32_offset: usize,
    /// Byte offset where 64-bit offsets start.
    offset64_offset: usize,
    /// Number of entries in the 64-bit offset table.
    offset64_count: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open and validate a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, MidxError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < 8 + 1024 + TRAILER_SIZE {
            return Err(MidxError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(MidxError::InvalidIndex("bad signature".into()));
        }
        let version = u32_be_at(&data, 4);
        if version != IDX_VERSION {
            return Err(MidxError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout = FanoutTable::from_be_bytes(&data[8..8 + 1024])
            .map_err(|e| MidxError::InvalidIndex(e.to_string()))?;
        let num_objects = fanout.total();

        let n = num_objects as usize;
        let oid_offset = 8 + 1024;
        let crc_offset = oid_offset + n * ObjectId::RAW_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        if data.len() < offset64_offset + TRAILER_SIZE {
            return Err(MidxError::InvalidIndex(format!(
                "file too small: {} < {}",
                data.len(),
                offset64_offset + TRAILER_SIZE
            )));
        }
        let offset64_count = (data.len() - TRAILER_SIZE - offset64_offset) / 8;

        // Every offset word that escapes to the 64-bit table must point
        // inside it, so enumeration below cannot go out of bounds.
        for i in 0..n {
            let word = u32_be_at(&data, offset32_offset + i * 4);
            if word & LARGE_OFFSET_FLAG != 0 {
                let idx64 = (word & !LARGE_OFFSET_FLAG) as usize;
                if idx64 >= offset64_count {
                    return Err(MidxError::InvalidIndex(format!(
                        "64-bit offset index {idx64} out of range ({offset64_count} entries)"
                    )));
                }
            }
        }

        Ok(Self {
            data,
            fanout,
            num_objects,
            oid_offset,
            offset32_offset,
            offset64_offset,
            offset64_count,
            idx_path,
        })
    }

    /// Total number of objects in this index.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Path to the .idx file.
    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    pub fn fanout(&self) -> &FanoutTable {
        &self.fanout
    }

    /// Get the OID at the given sorted index position.
    pub fn oid_at(&self, index: u32) -> ObjectId {
        let start = self.oid_offset + index as usize * ObjectId::RAW_LEN;
        let mut raw = [0u8; ObjectId::RAW_LEN];
        raw.copy_from_slice(&self.data[start..start + ObjectId::RAW_LEN]);
        ObjectId::from_raw(raw)
    }

    /// Get the pack file offset at the given sorted index position.
    pub fn offset_at(&self, index: u32) -> u64 {
        let word = u32_be_at(&self.data, self.offset32_offset + index as usize * 4);
        if word & LARGE_OFFSET_FLAG != 0 {
            let idx64 = (word & !LARGE_OFFSET_FLAG) as usize;
            u64_be_at(&self.data, self.offset64_offset + idx64 * 8)
        } else {
            word as u64
        }
    }

    /// Iterate over all (OID, offset) pairs in sorted OID order.
    pub fn entries(&self) -> PackIndexIter<'_> {
        PackIndexIter { index: self, pos: 0 }
    }
}

/// Iterator over (OID, offset) pairs in a pack index.
pub struct PackIndexIter<'a> {
    index: &'a PackIndex,
    pos: u32,
}

impl Iterator for PackIndexIter<'_> {
    type Item = (ObjectId, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.num_objects {
            return None;
        }
        let oid = self.index.oid_at(self.pos);
        let offset = self.index.offset_at(self.pos);
        self.pos += 1;
        Some((oid, offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PackIndexIter<'_> {}
