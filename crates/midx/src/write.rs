//! Multi-pack-index writing.
//!
//! A [`MidxWriter`] collects packs through the shared registry, then
//! [`dump`](MidxWriter::dump) merges their index entries and emits the
//! chunked file image; [`commit`](MidxWriter::commit) writes it atomically
//! next to the packs.

use std::sync::Arc;

use midx_hash::fanout::FANOUT_LEN;
use midx_hash::{FanoutTable, Hasher, ObjectId};
use midx_utils::tempfile::write_atomic;
use midx_utils::{BString, NormalPath};

use crate::registry::{swap_suffix, PackSource};
use crate::runtime::MidxRuntime;
use crate::{
    MidxEntry, MidxError, CHUNK_LARGE_OFFSETS, CHUNK_OBJECT_OFFSETS, CHUNK_OID_FANOUT,
    CHUNK_OID_LOOKUP, CHUNK_PACK_NAMES, LARGE_OFFSET_FLAG, MIDX_CHUNK_ENTRY_SIZE,
    MIDX_HEADER_SIZE, MIDX_OID_VERSION, MIDX_SIGNATURE, MIDX_VERSION,
};

/// What one dump produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub packs: usize,
    pub entries: usize,
    /// Entries dropped because an earlier entry carried the same OID.
    pub duplicates_collapsed: usize,
    /// Entries whose offset went to the large-offset chunk.
    pub large_offsets: usize,
}

/// Accumulates packs and writes the `multi-pack-index` for a pack
/// directory. Pack references are returned to the registry when the
/// writer is dropped (or [`free`](MidxWriter::free)d).
pub struct MidxWriter {
    runtime: Arc<MidxRuntime>,
    pack_dir: NormalPath,
    packs: Vec<Arc<PackSource>>,
}

impl MidxWriter {
    /// A writer bound to `pack_dir`, which is normalized up front.
    pub fn new(runtime: Arc<MidxRuntime>, pack_dir: impl AsRef<[u8]>) -> Result<Self, MidxError> {
        let pack_dir = NormalPath::new(pack_dir).normalize()?;
        Ok(Self {
            runtime,
            pack_dir,
            packs: Vec::new(),
        })
    }

    pub fn pack_dir(&self) -> &NormalPath {
        &self.pack_dir
    }

    /// Add the pack described by `idx_path` (resolved against the pack
    /// directory) to the set the next dump will index.
    pub fn add(&mut self, idx_path: impl AsRef<[u8]>) -> Result<(), MidxError> {
        let idx_path = NormalPath::prettify(idx_path, &self.pack_dir)?;
        let pack_path = swap_suffix(&idx_path, b".idx", b".pack").ok_or_else(|| {
            MidxError::InvalidIndex(format!("'{idx_path}' is not an .idx file"))
        })?;
        let pack = self.runtime.open_pack(&pack_path)?;
        self.packs.push(pack);
        Ok(())
    }

    /// Produce the index image into `out`. On failure `out` may hold a
    /// partial buffer the caller should discard.
    pub fn dump(&self, out: &mut Vec<u8>) -> Result<DumpStats, MidxError> {
        if self.packs.is_empty() {
            return Err(MidxError::InvalidFormat("no packs to index".into()));
        }

        // Index-name order defines pack_index and the PNAM table. The
        // same pack added twice collapses; two different packs with one
        // name cannot be represented.
        let mut sorted: Vec<&Arc<PackSource>> = self.packs.iter().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        sorted.dedup_by(|a, b| Arc::ptr_eq(*a, *b));
        for pair in sorted.windows(2) {
            if pair[0].name() == pair[1].name() {
                return Err(MidxError::InvalidFormat(format!(
                    "duplicate pack name '{}'",
                    pair[0].name()
                )));
            }
        }

        let names: Vec<BString> = sorted.iter().map(|p| p.name().to_owned()).collect();
        let mut entries = Vec::new();
        for (pack_index, pack) in sorted.iter().enumerate() {
            for (oid, offset) in pack.entries() {
                entries.push(MidxEntry {
                    oid,
                    pack_index: pack_index as u32,
                    offset,
                });
            }
        }

        encode(&names, entries, out)
    }

    /// Dump and atomically replace `<pack_dir>/multi-pack-index`,
    /// read-only. Either the previous index or the new one is visible.
    pub fn commit(&self) -> Result<DumpStats, MidxError> {
        let mut buf = Vec::new();
        let stats = self.dump(&mut buf)?;
        let target = self.pack_dir.join("multi-pack-index").to_os_path();
        write_atomic(target, &buf, 0o444)?;
        Ok(stats)
    }

    /// Release the writer, returning its pack references to the registry.
    pub fn free(self) {}
}

impl Drop for MidxWriter {
    fn drop(&mut self) {
        for pack in self.packs.drain(..) {
            // A poisoned registry at teardown has nothing left worth
            // surfacing.
            let _ = self.runtime.return_pack(pack);
        }
    }
}

/// Assemble a multi-pack-index image from sorted pack names and their
/// entries (`pack_index` already assigned against `names`).
pub(crate) fn encode(
    names: &[BString],
    mut entries: Vec<MidxEntry>,
    out: &mut Vec<u8>,
) -> Result<DumpStats, MidxError> {
    if names.is_empty() {
        return Err(MidxError::InvalidFormat("no packs to index".into()));
    }
    if entries.is_empty() {
        return Err(MidxError::InvalidFormat("no objects to index".into()));
    }

    // Canonical order: OID, then pack, then offset. One entry per OID
    // survives; the first of each run wins.
    entries.sort_by(|a, b| {
        (a.oid, a.pack_index, a.offset).cmp(&(b.oid, b.pack_index, b.offset))
    });
    let before = entries.len();
    entries.dedup_by_key(|e| e.oid);
    let duplicates_collapsed = before - entries.len();

    let mut pnam = Vec::new();
    for name in names {
        pnam.extend_from_slice(name.as_slice());
        pnam.push(0);
    }
    while pnam.len() % 4 != 0 {
        pnam.push(0);
    }

    let mut ooff = Vec::with_capacity(entries.len() * 8);
    let mut loff: Vec<u8> = Vec::new();
    for e in &entries {
        ooff.extend_from_slice(&e.pack_index.to_be_bytes());
        if e.offset < LARGE_OFFSET_FLAG as u64 {
            ooff.extend_from_slice(&(e.offset as u32).to_be_bytes());
        } else {
            let idx = (loff.len() / 8) as u32;
            ooff.extend_from_slice(&(LARGE_OFFSET_FLAG | idx).to_be_bytes());
            loff.extend_from_slice(&e.offset.to_be_bytes());
        }
    }

    let oids: Vec<ObjectId> = entries.iter().map(|e| e.oid).collect();
    let fanout = FanoutTable::build(&oids);

    let chunk_count: u8 = if loff.is_empty() { 4 } else { 5 };

    out.extend_from_slice(MIDX_SIGNATURE);
    out.push(MIDX_VERSION);
    out.push(MIDX_OID_VERSION);
    out.push(chunk_count);
    out.push(0); // no base multi-pack-index files
    out.extend_from_slice(&(names.len() as u32).to_be_bytes());

    // Chunk directory: absolute offsets, terminator at the trailer.
    let mut offset =
        (MIDX_HEADER_SIZE + (chunk_count as usize + 1) * MIDX_CHUNK_ENTRY_SIZE) as u64;
    chunk_entry(out, CHUNK_PACK_NAMES, offset);
    offset += pnam.len() as u64;
    chunk_entry(out, CHUNK_OID_FANOUT, offset);
    offset += FANOUT_LEN as u64;
    chunk_entry(out, CHUNK_OID_LOOKUP, offset);
    offset += (entries.len() * ObjectId::RAW_LEN) as u64;
    chunk_entry(out, CHUNK_OBJECT_OFFSETS, offset);
    offset += ooff.len() as u64;
    if !loff.is_empty() {
        chunk_entry(out, CHUNK_LARGE_OFFSETS, offset);
        offset += loff.len() as u64;
    }
    chunk_entry(out, 0, offset);

    out.extend_from_slice(&pnam);
    fanout.write_to(out);
    for e in &entries {
        out.extend_from_slice(e.oid.as_bytes());
    }
    out.extend_from_slice(&ooff);
    out.extend_from_slice(&loff);

    let digest = Hasher::digest(out)?;
    out.extend_from_slice(digest.as_bytes());

    Ok(DumpStats {
        packs: names.len(),
        entries: entries.len(),
        duplicates_collapsed,
        large_offsets: loff.len() / 8,
    })
}

fn chunk_entry(out: &mut Vec<u8>, id: u32, offset: u64) {
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&((offset >> 32) as u32).to_be_bytes());
    out.extend_from_slice(&(offset as u32).to_be_bytes());
}
