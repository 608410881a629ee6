//! Shared fixtures: synthetic `.pack`/`.idx` pairs with arbitrary entries.
//!
//! The pack data files carry only a valid header and trailer; the MIDX
//! machinery never reads object bodies, just the header through the
//! window cache and the `.idx` for enumeration.

use std::path::{Path, PathBuf};

use midx_hash::{FanoutTable, Hasher, ObjectId};
use midx::{IDX_SIGNATURE, IDX_VERSION, LARGE_OFFSET_FLAG, PACK_SIGNATURE, PACK_VERSION};

pub fn make_oid(first_byte: u8, suffix: u8) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[0] = first_byte;
    bytes[19] = suffix;
    ObjectId::from_raw(bytes)
}

/// Write `<stem>.pack` and `<stem>.idx` into `dir`; returns the idx path.
pub fn write_pack_pair(dir: &Path, stem: &str, entries: &[(ObjectId, u64)]) -> PathBuf {
    let pack_path = dir.join(format!("{stem}.pack"));
    let idx_path = dir.join(format!("{stem}.idx"));

    let mut pack = Vec::new();
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    let mut hasher = Hasher::new();
    hasher.update(&pack);
    let checksum = hasher.finalize().unwrap();
    pack.extend_from_slice(checksum.as_bytes());
    std::fs::write(&pack_path, &pack).unwrap();

    std::fs::write(&idx_path, build_idx(entries, &checksum)).unwrap();
    idx_path
}

fn build_idx(entries: &[(ObjectId, u64)], pack_checksum: &ObjectId) -> Vec<u8> {
    let mut entries: Vec<_> = entries.to_vec();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let oids: Vec<ObjectId> = entries.iter().map(|(oid, _)| *oid).collect();
    FanoutTable::build(&oids).write_to(&mut buf);

    for (oid, _) in &entries {
        buf.extend_from_slice(oid.as_bytes());
    }
    for _ in &entries {
        buf.extend_from_slice(&0u32.to_be_bytes());
    }

    let mut large = Vec::new();
    for (_, offset) in &entries {
        if *offset < LARGE_OFFSET_FLAG as u64 {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        } else {
            let idx64 = (large.len() / 8) as u32;
            buf.extend_from_slice(&(LARGE_OFFSET_FLAG | idx64).to_be_bytes());
            large.extend_from_slice(&offset.to_be_bytes());
        }
    }
    buf.extend_from_slice(&large);

    buf.extend_from_slice(pack_checksum.as_bytes());
    let mut hasher = Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(hasher.finalize().unwrap().as_bytes());
    buf
}
