//! Process-wide, reference-counted cache of opened pack files.
//!
//! Every writer (and any future reader of pack data) that needs a pack goes
//! through the registry, so one `.pack`/`.idx` pair is opened once per
//! process no matter how many callers use it. The reference count is the
//! `Arc` strong count, read and modified only under the registry lock;
//! when the last outside reference is returned the pack is dropped, which
//! deregisters its windows from the [`MwindowCache`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use midx_utils::reader::u32_be_at;
use midx_utils::{BStr, BString, ByteSlice, NormalPath};

use crate::idx::{PackIndex, PackIndexIter};
use crate::mwindow::{MwindowCache, MwindowCursor, MwindowFile};
use crate::{MidxError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// An opened pack: its `.idx` for enumeration plus its data file
/// registered with the window cache.
pub struct PackSource {
    /// Canonical path of the `.pack` file (the registry key).
    pack_path: NormalPath,
    /// File name of the `.idx`, as recorded in the multi-pack-index.
    name: BString,
    idx: PackIndex,
    mwf: MwindowFile,
}

impl PackSource {
    fn open(mwindow: &Arc<MwindowCache>, pack_path: NormalPath) -> Result<Self, MidxError> {
        let idx_path = swap_suffix(&pack_path, b".pack", b".idx").ok_or_else(|| {
            MidxError::InvalidPack(format!("'{pack_path}' is not a .pack file"))
        })?;
        let idx = PackIndex::open(idx_path.to_os_path())?;

        let mwf = MwindowCache::register_file(mwindow, pack_path.to_os_path())?;
        if mwf.size() < PACK_HEADER_SIZE as u64 {
            return Err(MidxError::InvalidPack("pack file too small".into()));
        }
        let mut cursor = MwindowCursor::new();
        mwindow.open(&mwf, &mut cursor, 0, PACK_HEADER_SIZE as u64)?;
        let header = cursor.bytes();
        if &header[0..4] != PACK_SIGNATURE {
            return Err(MidxError::InvalidPack("wrong pack signature".into()));
        }
        let version = u32_be_at(header, 4);
        if version != PACK_VERSION {
            return Err(MidxError::InvalidPack(format!(
                "unsupported pack version {version}"
            )));
        }
        let num_objects = u32_be_at(header, 8);
        if num_objects != idx.num_objects() {
            return Err(MidxError::InvalidPack(format!(
                "pack has {num_objects} objects but index has {}",
                idx.num_objects()
            )));
        }
        cursor.release();

        let name = idx_path.basename().to_owned();
        Ok(Self {
            pack_path,
            name,
            idx,
            mwf,
        })
    }

    /// Canonical path of the `.pack` file.
    pub fn path(&self) -> &NormalPath {
        &self.pack_path
    }

    /// The `.idx` file name (no directory), the form stored in a MIDX.
    pub fn name(&self) -> &BStr {
        self.name.as_bstr()
    }

    pub fn num_objects(&self) -> u32 {
        self.idx.num_objects()
    }

    /// Size of the pack data file in bytes.
    pub fn pack_size(&self) -> u64 {
        self.mwf.size()
    }

    /// Enumerate this pack's (OID, offset) pairs in sorted OID order.
    pub fn entries(&self) -> PackIndexIter<'_> {
        self.idx.entries()
    }
}

/// Replace the trailing `from` of a path with `to`.
pub(crate) fn swap_suffix(path: &NormalPath, from: &[u8], to: &[u8]) -> Option<NormalPath> {
    let bytes = path.as_bytes();
    let stem = bytes.strip_suffix(from)?;
    let mut out = stem.to_vec();
    out.extend_from_slice(to);
    Some(NormalPath::new(out))
}

/// The shared pack cache, keyed by canonical `.pack` path.
#[derive(Default)]
pub struct PackFileRegistry {
    packs: Mutex<HashMap<NormalPath, Arc<PackSource>>>,
}

impl PackFileRegistry {
    /// Get the pack at `path` (a `.pack` file), opening it on first use or
    /// handing out another reference to the already-open instance.
    pub fn get(
        &self,
        mwindow: &Arc<MwindowCache>,
        path: &NormalPath,
    ) -> Result<Arc<PackSource>, MidxError> {
        let canonical = canonical_path(path)?;
        let mut packs = self.packs.lock().map_err(|_| MidxError::Concurrency)?;
        if let Some(pack) = packs.get(&canonical) {
            return Ok(Arc::clone(pack));
        }
        let pack = Arc::new(PackSource::open(mwindow, canonical.clone())?);
        packs.insert(canonical, Arc::clone(&pack));
        Ok(pack)
    }

    /// Return a reference obtained from [`get`](Self::get). When the last
    /// outside reference comes back the pack is closed and its windows
    /// deregistered.
    pub fn put(&self, pack: Arc<PackSource>) -> Result<(), MidxError> {
        let mut packs = self.packs.lock().map_err(|_| MidxError::Concurrency)?;
        let key = pack.path().clone();
        drop(pack);
        let evicted = match packs.get(&key) {
            // Only the map's own reference left: close the pack.
            Some(entry) if Arc::strong_count(entry) == 1 => packs.remove(&key),
            _ => None,
        };
        drop(packs);
        // The pack drop deregisters mwindow state; do it without holding
        // the registry lock.
        drop(evicted);
        Ok(())
    }

    /// Number of packs currently open.
    pub fn len(&self) -> usize {
        self.packs.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn canonical_path(path: &NormalPath) -> Result<NormalPath, MidxError> {
    if path.is_absolute() {
        return Ok(path.normalize()?);
    }
    let cwd = std::env::current_dir()?;
    Ok(NormalPath::prettify(path.as_bytes(), &NormalPath::from(cwd.as_path()))?)
}
