//! Multi-pack-index file reading.
//!
//! The on-disk format is chunk-based, big-endian throughout:
//!
//! ```text
//! Header: MIDX (4) | version (1) | OID version (1) | chunks (1)
//!         | base files (1) | packfile count (4)
//! Chunk directory: (chunks + 1) × [id (4) | offset (4+4)],
//!         terminated by id 0 at the trailer offset
//! Chunks: PNAM  null-terminated .idx names, sorted, NUL-padded to 4
//!         OIDF  256 × 4-byte cumulative counts
//!         OIDL  N × 20-byte sorted OIDs
//!         OOFF  N × (pack index (4) | offset-or-marker (4))
//!         LOFF  optional, K × 8-byte large offsets
//! Trailer: 20-byte digest of everything preceding
//! ```
//!
//! Parsing validates every structural invariant up front; the bulk chunks
//! stay as offsets into the mapping and are read zero-copy on lookup.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use midx_hash::{FanoutTable, Hasher, ObjectId, OidPrefix};
use midx_hash::fanout::FANOUT_LEN;
use midx_utils::reader::{u32_be_at, u64_be_at, ByteReader};
use midx_utils::{BStr, BString, ByteSlice};

use crate::{
    MidxEntry, MidxError, CHUNK_LARGE_OFFSETS, CHUNK_OBJECT_OFFSETS, CHUNK_OID_FANOUT,
    CHUNK_OID_LOOKUP, CHUNK_PACK_NAMES, LARGE_OFFSET_FLAG, MIDX_CHUNK_ENTRY_SIZE,
    MIDX_HEADER_SIZE, MIDX_OID_VERSION, MIDX_SIGNATURE, MIDX_VERSION,
};

fn bad(detail: impl Into<String>) -> MidxError {
    MidxError::InvalidFormat(detail.into())
}

/// Validated structure of a multi-pack-index image: copied header data and
/// pack names, plus offsets of the bulk chunks into the underlying bytes.
#[derive(Debug)]
pub(crate) struct MidxLayout {
    pub num_packs: u32,
    pub pack_names: Vec<BString>,
    pub fanout: FanoutTable,
    pub num_objects: u32,
    pub oid_lookup_off: usize,
    pub object_offsets_off: usize,
    /// (offset, entry count) of the large-offset chunk, when present.
    pub large_offsets: Option<(usize, usize)>,
    pub checksum: ObjectId,
}

impl MidxLayout {
    pub(crate) fn parse(data: &[u8]) -> Result<Self, MidxError> {
        if data.len() < MIDX_HEADER_SIZE + ObjectId::RAW_LEN {
            return Err(bad("multi-pack index is too short"));
        }
        if &data[0..4] != MIDX_SIGNATURE {
            return Err(bad("wrong multi-pack-index signature"));
        }
        let version = data[4];
        if version != MIDX_VERSION {
            return Err(bad(format!("unsupported multi-pack-index version {version}")));
        }
        let oid_version = data[5];
        if oid_version != MIDX_OID_VERSION {
            return Err(bad(format!("unsupported object ID version {oid_version}")));
        }
        let chunks = data[6] as usize;
        if chunks == 0 {
            return Err(bad("multi-pack-index has no chunks"));
        }
        let base_files = data[7];
        if base_files != 0 {
            return Err(bad("unsupported multi-pack-index chain"));
        }
        let num_packs = u32_be_at(data, 8);

        let trailer_offset = data.len() - ObjectId::RAW_LEN;
        let checksum = ObjectId::from_bytes(&data[trailer_offset..])?;
        if Hasher::digest(&data[..trailer_offset])? != checksum {
            return Err(bad("index signature mismatch"));
        }

        let dir_len = (chunks + 1) * MIDX_CHUNK_ENTRY_SIZE;
        if MIDX_HEADER_SIZE + dir_len > trailer_offset {
            return Err(bad("truncated chunk directory"));
        }

        // Walk the directory. Each entry closes the previous chunk: its
        // length is the distance between the two offsets.
        let mut chunk_dir = ByteReader::new(&data[MIDX_HEADER_SIZE..MIDX_HEADER_SIZE + dir_len]);
        let mut bound = ChunkMap::default();
        let mut prev_id: Option<u32> = None;
        let mut prev_off = (MIDX_HEADER_SIZE + dir_len) as u64;

        for i in 0..=chunks {
            let id = chunk_dir.u32_be()?;
            let offset = (chunk_dir.u32_be()? as u64) << 32 | chunk_dir.u32_be()? as u64;
            if offset < prev_off {
                return Err(bad("chunk offsets are out of order"));
            }
            if let Some(prev) = prev_id {
                bound.bind(prev, prev_off as usize, (offset - prev_off) as usize)?;
            }
            if i == chunks {
                if id != 0 {
                    return Err(bad("missing chunk directory terminator"));
                }
                if offset > trailer_offset as u64 {
                    return Err(bad("chunk directory extends past the trailer"));
                }
            } else {
                if id == 0 {
                    return Err(bad("unexpected chunk directory terminator"));
                }
                if offset >= trailer_offset as u64 {
                    return Err(bad("chunk offset out of bounds"));
                }
                prev_id = Some(id);
                prev_off = offset;
            }
        }

        let (pnam_off, pnam_len) = bound.pnam.ok_or_else(|| bad("missing pack name chunk"))?;
        let (oidf_off, oidf_len) = bound.oidf.ok_or_else(|| bad("missing OID fanout chunk"))?;
        let (oidl_off, oidl_len) = bound.oidl.ok_or_else(|| bad("missing OID lookup chunk"))?;
        let (ooff_off, ooff_len) = bound
            .ooff
            .ok_or_else(|| bad("missing object offsets chunk"))?;

        if oidf_len != FANOUT_LEN {
            return Err(bad("OID fanout chunk is the wrong size"));
        }
        let fanout = FanoutTable::from_be_bytes(&data[oidf_off..oidf_off + FANOUT_LEN])
            .map_err(|e| bad(format!("invalid OID fanout - {e}")))?;
        let num_objects = fanout.total();
        let n = num_objects as usize;

        if oidl_len != n * ObjectId::RAW_LEN {
            return Err(bad("OID lookup chunk is the wrong size"));
        }
        for i in 1..n {
            let prev = &data[oidl_off + (i - 1) * ObjectId::RAW_LEN..][..ObjectId::RAW_LEN];
            let cur = &data[oidl_off + i * ObjectId::RAW_LEN..][..ObjectId::RAW_LEN];
            if prev >= cur {
                return Err(bad("OID lookup is out of order"));
            }
        }

        if ooff_len != n * 8 {
            return Err(bad("object offsets chunk is the wrong size"));
        }

        let large_offsets = match bound.loff {
            Some((off, len)) => {
                if len % 8 != 0 {
                    return Err(bad("large offsets chunk is the wrong size"));
                }
                Some((off, len / 8))
            }
            None => None,
        };

        let pack_names = parse_pack_names(&data[pnam_off..pnam_off + pnam_len], num_packs)?;

        Ok(Self {
            num_packs,
            pack_names,
            fanout,
            num_objects,
            oid_lookup_off: oidl_off,
            object_offsets_off: ooff_off,
            large_offsets,
            checksum,
        })
    }
}

#[derive(Default)]
struct ChunkMap {
    pnam: Option<(usize, usize)>,
    oidf: Option<(usize, usize)>,
    oidl: Option<(usize, usize)>,
    ooff: Option<(usize, usize)>,
    loff: Option<(usize, usize)>,
}

impl ChunkMap {
    fn bind(&mut self, id: u32, offset: usize, len: usize) -> Result<(), MidxError> {
        let slot = match id {
            CHUNK_PACK_NAMES => &mut self.pnam,
            CHUNK_OID_FANOUT => &mut self.oidf,
            CHUNK_OID_LOOKUP => &mut self.oidl,
            CHUNK_OBJECT_OFFSETS => &mut self.ooff,
            CHUNK_LARGE_OFFSETS => &mut self.loff,
            other => return Err(bad(format!("unrecognized chunk id {other:#010x}"))),
        };
        if slot.is_some() {
            return Err(bad(format!("duplicate chunk id {id:#010x}")));
        }
        *slot = Some((offset, len));
        Ok(())
    }
}

/// Read `count` NUL-terminated pack names, enforcing the `.idx` suffix,
/// the no-separator rule, and strict ordering.
fn parse_pack_names(chunk: &[u8], count: u32) -> Result<Vec<BString>, MidxError> {
    let mut reader = ByteReader::new(chunk);
    let mut names: Vec<BString> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader
            .cstr()
            .map_err(|_| bad("pack names chunk is corrupted"))?;
        if !name.ends_with(b".idx") {
            return Err(bad(format!("invalid pack name '{}'", name.as_bstr())));
        }
        if name.iter().any(|&b| b == b'/' || b == b'\\') {
            return Err(bad(format!(
                "pack name '{}' contains a path separator",
                name.as_bstr()
            )));
        }
        if let Some(prev) = names.last() {
            if prev.as_slice() >= name {
                return Err(bad("pack names are out of order"));
            }
        }
        names.push(BString::from(name));
    }
    Ok(names)
}

/// An opened multi-pack-index.
///
/// Holds the file mapped read-only for its whole lifetime; every entry
/// returned by [`find`](Midx::find) stays valid as long as the `Midx`
/// lives, and the referenced pack can be opened independently through the
/// pack registry.
#[derive(Debug)]
pub struct Midx {
    data: Mmap,
    path: PathBuf,
    layout: MidxLayout,
}

impl Midx {
    /// Open and fully validate a multi-pack-index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MidxError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };
        let layout = MidxLayout::parse(&data)?;
        Ok(Self { data, path, layout })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_objects(&self) -> u32 {
        self.layout.num_objects
    }

    pub fn num_packs(&self) -> u32 {
        self.layout.num_packs
    }

    /// The `.idx` names of the indexed packs, in their on-disk order.
    /// `MidxEntry::pack_index` indexes into this table.
    pub fn pack_names(&self) -> &[BString] {
        &self.layout.pack_names
    }

    pub fn pack_name(&self, pack_index: u32) -> Option<&BStr> {
        self.layout
            .pack_names
            .get(pack_index as usize)
            .map(|n| n.as_bstr())
    }

    /// The digest stored in the trailer.
    pub fn checksum(&self) -> &ObjectId {
        &self.layout.checksum
    }

    /// Look up an object by (possibly abbreviated) OID.
    pub fn find(&self, prefix: &OidPrefix) -> Result<MidxEntry, MidxError> {
        let n = self.layout.num_objects as usize;
        let bucket = self.layout.fanout.range(prefix.first_byte());
        let target = prefix.as_bytes();

        // Zero-padding makes the prefix sort at or before every match, so
        // the insertion point is the first candidate.
        let mut low = bucket.start;
        let mut high = bucket.end;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.oid_bytes_at(mid) < target {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        let pos = low;
        if pos >= n || !prefix.matches(&self.oid_at(pos as u32)) {
            return Err(MidxError::NotFound {
                prefix: prefix.to_string(),
            });
        }
        if !prefix.is_full() && pos + 1 < n && prefix.matches(&self.oid_at(pos as u32 + 1)) {
            return Err(MidxError::Ambiguous {
                prefix: prefix.to_string(),
            });
        }
        self.entry_at(pos as u32)
    }

    /// Look up an exact OID.
    pub fn lookup(&self, oid: &ObjectId) -> Result<MidxEntry, MidxError> {
        self.find(&OidPrefix::full(oid))
    }

    /// The OID at the given sorted table position.
    pub fn oid_at(&self, pos: u32) -> ObjectId {
        let mut raw = [0u8; ObjectId::RAW_LEN];
        raw.copy_from_slice(self.oid_bytes_at(pos as usize));
        ObjectId::from_raw(raw)
    }

    /// Iterate all entries in sorted OID order.
    pub fn entries(&self) -> MidxIter<'_> {
        MidxIter { midx: self, pos: 0 }
    }

    /// Whether the file at `path` no longer matches this loaded image:
    /// missing or unreadable, not a regular file, different size, or a
    /// different trailing digest. False only when nothing changed.
    pub fn needs_refresh(&self, path: impl AsRef<Path>) -> bool {
        fn unchanged(midx: &Midx, path: &Path) -> std::io::Result<bool> {
            let meta = std::fs::metadata(path)?;
            if !meta.is_file() || meta.len() != midx.data.len() as u64 {
                return Ok(false);
            }
            let mut file = std::fs::File::open(path)?;
            file.seek(SeekFrom::End(-(ObjectId::RAW_LEN as i64)))?;
            let mut trailer = [0u8; ObjectId::RAW_LEN];
            file.read_exact(&mut trailer)?;
            Ok(trailer == *midx.layout.checksum.as_bytes())
        }
        !unchanged(self, path.as_ref()).unwrap_or(false)
    }

    fn oid_bytes_at(&self, pos: usize) -> &[u8] {
        let start = self.layout.oid_lookup_off + pos * ObjectId::RAW_LEN;
        &self.data[start..start + ObjectId::RAW_LEN]
    }

    fn entry_at(&self, pos: u32) -> Result<MidxEntry, MidxError> {
        let off = self.layout.object_offsets_off + pos as usize * 8;
        let pack_index = u32_be_at(&self.data, off);
        let word = u32_be_at(&self.data, off + 4);

        let offset = if word & LARGE_OFFSET_FLAG != 0 {
            let (loff, count) = self
                .layout
                .large_offsets
                .ok_or_else(|| bad("object needs a large offset but the chunk is missing"))?;
            let idx = (word & !LARGE_OFFSET_FLAG) as usize;
            if idx >= count {
                return Err(bad(format!(
                    "large offset index {idx} out of range ({count} entries)"
                )));
            }
            u64_be_at(&self.data, loff + idx * 8)
        } else {
            word as u64
        };

        if pack_index as usize >= self.layout.pack_names.len() {
            return Err(bad(format!(
                "object references pack {pack_index} but only {} packs are listed",
                self.layout.pack_names.len()
            )));
        }

        Ok(MidxEntry {
            oid: self.oid_at(pos),
            pack_index,
            offset,
        })
    }
}

/// Iterator over all MIDX entries in sorted OID order.
pub struct MidxIter<'a> {
    midx: &'a Midx,
    pos: u32,
}

impl Iterator for MidxIter<'_> {
    type Item = Result<MidxEntry, MidxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.midx.layout.num_objects {
            return None;
        }
        let entry = self.midx.entry_at(self.pos);
        self.pos += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.midx.layout.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::encode;
    use crate::MidxEntry;

    fn make_oid(hex: &str) -> ObjectId {
        // Right-pad short hex to a full OID for fixture brevity.
        let full = format!("{hex:0<40}");
        ObjectId::from_hex(&full).unwrap()
    }

    fn entry(hex: &str, pack_index: u32, offset: u64) -> MidxEntry {
        MidxEntry {
            oid: make_oid(hex),
            pack_index,
            offset,
        }
    }

    fn names(names: &[&str]) -> Vec<BString> {
        names.iter().map(|n| BString::from(*n)).collect()
    }

    fn build(entries: &[MidxEntry], pack_names: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        encode(&names(pack_names), entries.to_vec(), &mut out).unwrap();
        out
    }

    fn open_bytes(dir: &Path, data: &[u8]) -> Result<Midx, MidxError> {
        let path = dir.join("multi-pack-index");
        std::fs::write(&path, data).unwrap();
        Midx::open(&path)
    }

    /// Recompute the trailer digest after corrupting bytes on purpose.
    fn resign(buf: &mut [u8]) {
        let trailer = buf.len() - 20;
        let digest = Hasher::digest(&buf[..trailer]).unwrap();
        buf[trailer..].copy_from_slice(digest.as_bytes());
    }

    const PACKS: &[&str] = &["pack-aaaa.idx", "pack-bbbb.idx"];

    fn sample() -> Vec<u8> {
        build(
            &[
                entry("5001298e0c09ad9c34e4249bc5801c75e9754fa5", 0, 100),
                entry("5001299", 1, 200),
                entry("ab", 0, 300),
                entry("01", 1, 400),
            ],
            PACKS,
        )
    }

    #[test]
    fn open_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let midx = open_bytes(dir.path(), &sample()).unwrap();

        assert_eq!(midx.num_objects(), 4);
        assert_eq!(midx.num_packs(), 2);
        assert_eq!(midx.pack_names().len(), 2);
        assert_eq!(midx.pack_name(1).unwrap(), "pack-bbbb.idx");

        let oid = make_oid("5001298e0c09ad9c34e4249bc5801c75e9754fa5");
        let found = midx.lookup(&oid).unwrap();
        assert_eq!(found.oid, oid);
        assert_eq!(found.pack_index, 0);
        assert_eq!(found.offset, 100);

        let missing = make_oid("ff");
        assert!(matches!(
            midx.lookup(&missing),
            Err(MidxError::NotFound { .. })
        ));
    }

    #[test]
    fn prefix_lookup_and_ambiguity() {
        let dir = tempfile::tempdir().unwrap();
        let midx = open_bytes(dir.path(), &sample()).unwrap();

        // Unique 7-nibble prefix selects the same entry as the full OID.
        let p = OidPrefix::from_hex("5001298").unwrap();
        let found = midx.find(&p).unwrap();
        assert_eq!(found.offset, 100);
        assert_eq!(found.oid, make_oid("5001298e0c09ad9c34e4249bc5801c75e9754fa5"));

        // Both 0x500129... entries share the first 6 nibbles.
        let p = OidPrefix::from_hex("500129").unwrap();
        assert!(matches!(midx.find(&p), Err(MidxError::Ambiguous { .. })));

        // A one-nibble prefix with a single match works.
        let p = OidPrefix::from_hex("a").unwrap();
        assert_eq!(midx.find(&p).unwrap().offset, 300);

        let p = OidPrefix::from_hex("e").unwrap();
        assert!(matches!(midx.find(&p), Err(MidxError::NotFound { .. })));
    }

    #[test]
    fn corrupt_trailer_is_a_signature_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = sample();
        let last = data.len() - 1;
        data[last] ^= 0xff;

        let err = open_bytes(dir.path(), &data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid multi-pack-index file - index signature mismatch"
        );
    }

    #[test]
    fn header_validation() {
        let dir = tempfile::tempdir().unwrap();

        let mut data = sample();
        data[0] = b'X';
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("signature"));

        let mut data = sample();
        data[4] = 9;
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("version 9"));

        let mut data = sample();
        data[5] = 2;
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("object ID version"));

        let mut data = sample();
        data[7] = 1;
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("chain"));

        let err = open_bytes(dir.path(), &[0u8; 16]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn chunk_directory_validation() {
        let dir = tempfile::tempdir().unwrap();

        // Unknown chunk id: clobber the PNAM id.
        let mut data = sample();
        data[MIDX_HEADER_SIZE..MIDX_HEADER_SIZE + 4].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("unrecognized chunk id"));

        // Duplicate chunk id: make the second entry PNAM as well.
        let mut data = sample();
        let second = MIDX_HEADER_SIZE + MIDX_CHUNK_ENTRY_SIZE;
        data[second..second + 4].copy_from_slice(&CHUNK_PACK_NAMES.to_be_bytes());
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("duplicate chunk"));

        // Out-of-order offsets: move the second chunk before the first.
        let mut data = sample();
        data[second + 4..second + 12].copy_from_slice(&1u64.to_be_bytes());
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("out of order"));
    }

    #[test]
    fn oid_lookup_order_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = sample();

        // Swap the first two 20-byte OID lookup records.
        let midx = open_bytes(dir.path(), &data).unwrap();
        let oidl = midx.layout.oid_lookup_off;
        drop(midx);
        let (a, b) = (oidl, oidl + 20);
        for i in 0..20 {
            data.swap(a + i, b + i);
        }
        resign(&mut data);

        let err = open_bytes(dir.path(), &data).unwrap_err();
        assert!(err.to_string().contains("OID lookup is out of order"));
    }

    #[test]
    fn pack_name_validation() {
        let dir = tempfile::tempdir().unwrap();
        // PNAM is the first chunk the writer emits, right after the
        // directory (4 chunks + terminator).
        let pnam = MIDX_HEADER_SIZE + 5 * MIDX_CHUNK_ENTRY_SIZE;

        // "pack-aaaa.idx" → "qack-aaaa.idx": sorts after "pack-bbbb.idx".
        let mut data = sample();
        data[pnam] = b'q';
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("out of order"));

        // Path separator inside a name.
        let mut data = sample();
        data[pnam] = b'/';
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("path separator"));

        // Wrong suffix.
        let mut data = sample();
        data[pnam + 10..pnam + 13].copy_from_slice(b"txt");
        resign(&mut data);
        assert!(open_bytes(dir.path(), &data)
            .unwrap_err()
            .to_string()
            .contains("invalid pack name"));
    }

    #[test]
    fn large_offsets_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        // 2^31 - 1 still fits inline: four chunks, no LOFF.
        let data = build(&[entry("10", 0, 0x7fff_ffff)], &["pack-aaaa.idx"]);
        assert_eq!(data[6], 4);
        let midx = open_bytes(dir.path(), &data).unwrap();
        assert_eq!(midx.lookup(&make_oid("10")).unwrap().offset, 0x7fff_ffff);

        // 2^31 needs the large-offset chunk.
        let data = build(
            &[entry("10", 0, 0x8000_0000), entry("20", 0, 0x8000_0001), entry("30", 0, 7)],
            &["pack-aaaa.idx"],
        );
        assert_eq!(data[6], 5);
        let midx = open_bytes(dir.path(), &data).unwrap();
        assert_eq!(midx.lookup(&make_oid("10")).unwrap().offset, 0x8000_0000);
        assert_eq!(midx.lookup(&make_oid("20")).unwrap().offset, 0x8000_0001);
        assert_eq!(midx.lookup(&make_oid("30")).unwrap().offset, 7);
    }

    #[test]
    fn entries_iterates_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let midx = open_bytes(dir.path(), &sample()).unwrap();

        let entries: Vec<MidxEntry> = midx.entries().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 4);
        for pair in entries.windows(2) {
            assert!(pair[0].oid < pair[1].oid);
        }
        assert_eq!(entries[0].oid, make_oid("01"));
        assert_eq!(entries[0].offset, 400);
    }

    #[test]
    fn needs_refresh_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi-pack-index");
        std::fs::write(&path, sample()).unwrap();

        let midx = Midx::open(&path).unwrap();
        assert!(!midx.needs_refresh(&path));

        // Flip a byte inside the trailer.
        let mut data = sample();
        let last = data.len() - 1;
        data[last] ^= 0x01;
        std::fs::write(&path, &data).unwrap();
        assert!(midx.needs_refresh(&path));

        // Different size.
        std::fs::write(&path, &data[..data.len() - 1]).unwrap();
        assert!(midx.needs_refresh(&path));

        // Gone entirely.
        std::fs::remove_file(&path).unwrap();
        assert!(midx.needs_refresh(&path));
    }
}
