//! Multi-pack-index (MIDX) reading and writing.
//!
//! A multi-pack-index merges the indices of many pack files into one file,
//! so a lookup finds the owning pack and the byte offset within it without
//! consulting each pack's own `.idx`. This crate provides:
//!
//! - [`Midx`], the memory-mapped reader with prefix lookup,
//! - [`MidxWriter`], which accumulates packs and emits the index atomically,
//! - [`MwindowCache`], the process-wide LRU cache of memory-mapped
//!   windows over pack files,
//! - [`PackFileRegistry`], the shared, reference-counted cache of opened
//!   packs, reachable through [`MidxRuntime`].

pub mod file;
pub mod idx;
pub mod mwindow;
pub mod registry;
pub mod runtime;
pub mod write;

use midx_hash::{HashError, ObjectId};
use midx_utils::UtilError;

pub use file::Midx;
pub use mwindow::{MwindowCache, MwindowCursor, MwindowError, MwindowFile, MwindowStats};
pub use registry::{PackFileRegistry, PackSource};
pub use runtime::MidxRuntime;
pub use write::{DumpStats, MidxWriter};

/// Errors that can occur during multi-pack-index operations.
#[derive(Debug, thiserror::Error)]
pub enum MidxError {
    #[error("invalid multi-pack-index file - {0}")]
    InvalidFormat(String),

    #[error("invalid pack index - {0}")]
    InvalidIndex(String),

    #[error("invalid pack file - {0}")]
    InvalidPack(String),

    #[error("no match for prefix {prefix}")]
    NotFound { prefix: String },

    #[error("found multiple matches for prefix {prefix}")]
    Ambiguous { prefix: String },

    #[error("pack registry lock poisoned")]
    Concurrency,

    #[error(transparent)]
    Mwindow(#[from] MwindowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Util(#[from] UtilError),
}

/// One object as recorded by the multi-pack-index: which pack holds it and
/// at which byte offset its entry starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidxEntry {
    pub oid: ObjectId,
    /// Index into the MIDX's pack name table.
    pub pack_index: u32,
    /// Byte offset of the object inside that pack.
    pub offset: u64,
}

/// MIDX signature bytes.
pub const MIDX_SIGNATURE: &[u8; 4] = b"MIDX";
/// Supported MIDX format version.
pub const MIDX_VERSION: u8 = 1;
/// Supported object-ID version (1 = 20-byte digests).
pub const MIDX_OID_VERSION: u8 = 1;
/// Fixed header width: signature, version, OID version, chunk count,
/// base file count, packfile count.
pub const MIDX_HEADER_SIZE: usize = 12;
/// Width of a chunk directory entry: 4-byte id + 8-byte offset.
pub const MIDX_CHUNK_ENTRY_SIZE: usize = 12;

/// Chunk IDs used in MIDX files.
pub const CHUNK_PACK_NAMES: u32 = 0x504e_414d; // "PNAM"
pub const CHUNK_OID_FANOUT: u32 = 0x4f49_4446; // "OIDF"
pub const CHUNK_OID_LOOKUP: u32 = 0x4f49_444c; // "OIDL"
pub const CHUNK_OBJECT_OFFSETS: u32 = 0x4f4f_4646; // "OOFF"
pub const CHUNK_LARGE_OFFSETS: u32 = 0x4c4f_4646; // "LOFF"

/// Offset words with this bit set index the large-offset chunk instead of
/// carrying the offset inline.
pub const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Pack file header constants (validated when a pack is opened).
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;
