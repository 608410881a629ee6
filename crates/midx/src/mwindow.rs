//! Process-wide LRU cache of memory-mapped windows over pack files.
//!
//! Pack data is reached through aligned, size-capped mmap windows shared by
//! every reader and writer in the process. The cache keeps total mapped
//! bytes under a soft limit (and optionally caps open descriptors) by
//! evicting least-recently-used windows that no cursor currently borrows.
//!
//! A [`MwindowCursor`] pins its window by holding a clone of the mapping's
//! `Arc`, so the returned bytes stay valid without the cache lock even if
//! the window is evicted concurrently; the actual unmap happens when the
//! last cursor drops.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use memmap2::{Mmap, MmapOptions};

/// Default window size: 1 GiB on 64-bit targets, 32 MiB on 32-bit.
pub const DEFAULT_WINDOW_SIZE: u64 = if cfg!(target_pointer_width = "64") {
    1024 * 1024 * 1024
} else {
    32 * 1024 * 1024
};

/// Default soft cap on total mapped bytes: 8 GiB on 64-bit, 256 MiB on 32-bit.
pub const DEFAULT_MAPPED_LIMIT: u64 = if cfg!(target_pointer_width = "64") {
    8 * 1024 * 1024 * 1024
} else {
    256 * 1024 * 1024
};

/// Default limit on concurrently open pack descriptors (0 = unlimited).
pub const DEFAULT_FILE_LIMIT: usize = 0;

/// Errors produced by the memory-window cache.
#[derive(Debug, thiserror::Error)]
pub enum MwindowError {
    #[error("window [{offset}, {offset}+{extra}) is out of bounds of file of size {size}")]
    OutOfBounds { offset: u64, extra: u64, size: u64 },

    #[error("requested span of {extra} contiguous bytes exceeds the window size")]
    SpanTooLarge { extra: u64 },

    #[error("memory-window lock poisoned")]
    Concurrency,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One mapped region of a pack file.
struct Window {
    /// Page-aligned file offset where the mapping starts.
    base: u64,
    map: Arc<Mmap>,
    last_used: u64,
}

impl Window {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn contains(&self, offset: u64, extra: u64) -> bool {
        offset >= self.base && offset + extra <= self.base + self.len()
    }

    /// A window is in use while any cursor still holds its mapping.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.map) > 1
    }
}

/// Per-pack entry: descriptor (lazily reopened after an fd-limit close)
/// plus the file's active windows.
struct FileSlot {
    path: PathBuf,
    file: Option<File>,
    size: u64,
    windows: Vec<Window>,
}

#[derive(Default)]
struct CacheState {
    files: Vec<Option<FileSlot>>,
    used_ctr: u64,
    mapped_bytes: u64,
    open_windows: usize,
    open_files: usize,
    peak_mapped_bytes: u64,
    peak_open_windows: usize,
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MwindowStats {
    pub mapped_bytes: u64,
    pub open_windows: usize,
    pub open_files: usize,
    pub peak_mapped_bytes: u64,
    pub peak_open_windows: usize,
}

/// The shared window cache. One instance serves the whole process (see
/// [`crate::MidxRuntime::global`]); tests build private instances with
/// tighter limits through [`MwindowCache::with_limits`].
pub struct MwindowCache {
    window_size: u64,
    mapped_limit: u64,
    file_limit: usize,
    state: Mutex<CacheState>,
}

/// Registration handle for one pack file. Dropping it removes the file and
/// all its windows from the cache.
pub struct MwindowFile {
    cache: Arc<MwindowCache>,
    token: usize,
    size: u64,
}

impl MwindowFile {
    /// Size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for MwindowFile {
    fn drop(&mut self) {
        self.cache.deregister(self.token);
    }
}

/// A borrowed view into one window. While a cursor is valid its bytes may
/// be read without any locking; [`release`](MwindowCursor::release) (or
/// drop) lets the window become evictable again.
#[derive(Default)]
pub struct MwindowCursor {
    window: Option<Arc<Mmap>>,
    base: u64,
    offset: u64,
}

impl MwindowCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.window.is_some()
    }

    /// The mapped bytes from the requested offset to the end of the window.
    /// Empty when the cursor is unset.
    pub fn bytes(&self) -> &[u8] {
        match &self.window {
            Some(map) => &map[(self.offset - self.base) as usize..],
            None => &[],
        }
    }

    /// Drop the window reference, making the window evictable.
    pub fn release(&mut self) {
        self.window = None;
    }

    fn covers(&self, offset: u64, extra: u64) -> bool {
        self.window
            .as_ref()
            .is_some_and(|map| offset >= self.base && offset + extra <= self.base + map.len() as u64)
    }

    fn set(&mut self, map: Arc<Mmap>, base: u64, offset: u64) {
        self.window = Some(map);
        self.base = base;
        self.offset = offset;
    }
}

impl MwindowCache {
    /// A cache with the default limits.
    pub fn new() -> Arc<Self> {
        Self::with_limits(DEFAULT_WINDOW_SIZE, DEFAULT_MAPPED_LIMIT, DEFAULT_FILE_LIMIT)
    }

    /// A cache with explicit limits. Half of `window_size` is the mapping
    /// alignment and must be a multiple of the page size.
    pub fn with_limits(window_size: u64, mapped_limit: u64, file_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            window_size,
            mapped_limit,
            file_limit,
            state: Mutex::new(CacheState::default()),
        })
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    pub fn stats(&self) -> Result<MwindowStats, MwindowError> {
        let state = self.lock()?;
        Ok(MwindowStats {
            mapped_bytes: state.mapped_bytes,
            open_windows: state.open_windows,
            open_files: state.open_files,
            peak_mapped_bytes: state.peak_mapped_bytes,
            peak_open_windows: state.peak_open_windows,
        })
    }

    /// Add a file to the cache. May close the least-recently-used file's
    /// descriptor first when a descriptor limit is configured.
    pub fn register_file(
        cache: &Arc<MwindowCache>,
        path: impl AsRef<Path>,
    ) -> Result<MwindowFile, MwindowError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let mut state = cache.lock()?;
        if cache.file_limit > 0 && state.open_files >= cache.file_limit {
            close_lru_file(&mut state);
        }
        let slot = FileSlot {
            path,
            file: Some(file),
            size,
            windows: Vec::new(),
        };
        let token = match state.files.iter().position(Option::is_none) {
            Some(i) => {
                state.files[i] = Some(slot);
                i
            }
            None => {
                state.files.push(Some(slot));
                state.files.len() - 1
            }
        };
        state.open_files += 1;

        Ok(MwindowFile {
            cache: Arc::clone(cache),
            token,
            size,
        })
    }

    /// Position `cursor` on a window containing `[offset, offset + extra)`.
    ///
    /// Reuses the cursor's current window when it already covers the span,
    /// else picks or creates one, updating its LRU tick. On success
    /// `cursor.bytes()` starts at `offset` and holds at least `extra`
    /// addressable bytes.
    pub fn open(
        &self,
        file: &MwindowFile,
        cursor: &mut MwindowCursor,
        offset: u64,
        extra: u64,
    ) -> Result<(), MwindowError> {
        if offset.checked_add(extra).map_or(true, |end| end > file.size) {
            return Err(MwindowError::OutOfBounds {
                offset,
                extra,
                size: file.size,
            });
        }
        if cursor.covers(offset, extra) {
            cursor.offset = offset;
            return Ok(());
        }

        let mut state = self.lock()?;
        // The old window must not count as borrowed while we pick the next
        // one, or it could never be the eviction victim.
        cursor.release();

        state.used_ctr += 1;
        let tick = state.used_ctr;

        let slot = state.files[file.token].as_mut().expect("registered file slot");
        if let Some(w) = slot.windows.iter_mut().find(|w| w.contains(offset, extra)) {
            w.last_used = tick;
            cursor.set(Arc::clone(&w.map), w.base, offset);
            return Ok(());
        }

        let (map, base) = self.new_window(&mut state, file.token, offset, extra, tick)?;
        cursor.set(map, base, offset);
        Ok(())
    }

    /// Map a new window for `[offset, offset + extra)`, evicting unused
    /// windows first while the soft limit would be reached.
    fn new_window(
        &self,
        state: &mut CacheState,
        token: usize,
        offset: u64,
        extra: u64,
        tick: u64,
    ) -> Result<(Arc<Mmap>, u64), MwindowError> {
        let halfwindow = self.window_size / 2;
        let base = offset / halfwindow * halfwindow;
        let size = state.files[token].as_ref().expect("registered file slot").size;
        let len = (size - base).min(self.window_size);
        if offset + extra > base + len {
            return Err(MwindowError::SpanTooLarge { extra });
        }

        while state.mapped_bytes + len >= self.mapped_limit {
            if !close_lru_window(state) {
                break;
            }
        }

        let map = match self.map_range(state, token, base, len) {
            Ok(map) => map,
            Err(_) => {
                // Address space may be exhausted; unmap everything
                // evictable and retry once. The soft limit can be exceeded
                // when nothing is evictable.
                while close_lru_window(state) {}
                self.map_range(state, token, base, len)?
            }
        };

        state.mapped_bytes += len;
        state.open_windows += 1;
        state.peak_mapped_bytes = state.peak_mapped_bytes.max(state.mapped_bytes);
        state.peak_open_windows = state.peak_open_windows.max(state.open_windows);

        let map = Arc::new(map);
        let slot = state.files[token].as_mut().expect("registered file slot");
        slot.windows.push(Window {
            base,
            map: Arc::clone(&map),
            last_used: tick,
        });
        Ok((map, base))
    }

    fn map_range(
        &self,
        state: &mut CacheState,
        token: usize,
        base: u64,
        len: u64,
    ) -> Result<Mmap, MwindowError> {
        let mut reopened = false;
        {
            let slot = state.files[token].as_mut().expect("registered file slot");
            if slot.file.is_none() {
                slot.file = Some(File::open(&slot.path)?);
                reopened = true;
            }
        }
        if reopened {
            state.open_files += 1;
        }
        let slot = state.files[token].as_ref().expect("registered file slot");
        let file = slot.file.as_ref().expect("descriptor just ensured open");
        let map = unsafe { MmapOptions::new().offset(base).len(len as usize).map(file)? };
        Ok(map)
    }

    /// Remove a file and all its windows from the cache.
    fn deregister(&self, token: usize) {
        // Called from Drop: a poisoned lock leaves the slot to process
        // teardown rather than panicking again.
        let Ok(mut state) = self.state.lock() else { return };
        if let Some(slot) = state.files[token].take() {
            let mut freed = 0u64;
            for w in &slot.windows {
                debug_assert!(!w.in_use(), "deregistering a file with a borrowed window");
                freed += w.len();
            }
            state.mapped_bytes -= freed;
            state.open_windows -= slot.windows.len();
            if slot.file.is_some() {
                state.open_files -= 1;
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, MwindowError> {
        self.state.lock().map_err(|_| MwindowError::Concurrency)
    }
}

/// Unmap the single unused window with the smallest LRU tick, across all
/// files. Returns false when every window is borrowed.
fn close_lru_window(state: &mut CacheState) -> bool {
    let mut victim: Option<(usize, usize, u64)> = None;
    for (fi, slot) in state.files.iter().enumerate() {
        let Some(slot) = slot else { continue };
        for (wi, w) in slot.windows.iter().enumerate() {
            if !w.in_use() && victim.map_or(true, |(_, _, lru)| w.last_used < lru) {
                victim = Some((fi, wi, w.last_used));
            }
        }
    }
    let Some((fi, wi, _)) = victim else {
        return false;
    };
    let w = state.files[fi]
        .as_mut()
        .expect("victim slot exists")
        .windows
        .swap_remove(wi);
    state.mapped_bytes -= w.len();
    state.open_windows -= 1;
    true
}

/// Close the descriptor (and free the windows) of the file whose
/// most-recently-used window is the least recent across all files with no
/// borrowed windows. Returns false when no file qualifies.
fn close_lru_file(state: &mut CacheState) -> bool {
    let mut victim: Option<(usize, u64)> = None;
    for (fi, slot) in state.files.iter().enumerate() {
        let Some(slot) = slot else { continue };
        if slot.file.is_none() || slot.windows.iter().any(Window::in_use) {
            continue;
        }
        let mru = slot.windows.iter().map(|w| w.last_used).max().unwrap_or(0);
        if victim.map_or(true, |(_, best)| mru < best) {
            victim = Some((fi, mru));
        }
    }
    let Some((fi, _)) = victim else {
        return false;
    };
    let windows = {
        let slot = state.files[fi].as_mut().expect("victim slot exists");
        slot.file = None;
        std::mem::take(&mut slot.windows)
    };
    for w in &windows {
        state.mapped_bytes -= w.len();
        state.open_windows -= 1;
    }
    state.open_files -= 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // Window geometry used throughout: 4-page windows, 2-page alignment.
    const WIN: u64 = 16384;

    fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn open_returns_requested_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pack", 1000);
        let cache = MwindowCache::with_limits(WIN, 10 * WIN, 0);
        let file = MwindowCache::register_file(&cache, &path).unwrap();

        let mut cursor = MwindowCursor::new();
        cache.open(&file, &mut cursor, 10, 4).unwrap();
        let bytes = cursor.bytes();
        assert!(bytes.len() >= 4);
        assert_eq!(bytes[0], 10 % 251);
        assert_eq!(bytes[1], 11 % 251);
    }

    #[test]
    fn cursor_reuse_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pack", WIN as usize);
        let cache = MwindowCache::with_limits(WIN, 10 * WIN, 0);
        let file = MwindowCache::register_file(&cache, &path).unwrap();

        let mut cursor = MwindowCursor::new();
        cache.open(&file, &mut cursor, 0, 12).unwrap();
        assert_eq!(cache.stats().unwrap().open_windows, 1);

        // Second span inside the same window: no new mapping.
        cache.open(&file, &mut cursor, 100, 12).unwrap();
        assert_eq!(cache.stats().unwrap().open_windows, 1);
        assert_eq!(cursor.bytes()[0], 100 % 251);
    }

    #[test]
    fn rejects_out_of_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pack", 100);
        let cache = MwindowCache::with_limits(WIN, 10 * WIN, 0);
        let file = MwindowCache::register_file(&cache, &path).unwrap();

        let mut cursor = MwindowCursor::new();
        let err = cache.open(&file, &mut cursor, 90, 20).unwrap_err();
        assert!(matches!(err, MwindowError::OutOfBounds { .. }));
        assert!(!cursor.is_valid());
    }

    #[test]
    fn eviction_keeps_most_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pack", 3 * WIN as usize);
        // Soft limit of two windows.
        let cache = MwindowCache::with_limits(WIN, 2 * WIN, 0);
        let file = MwindowCache::register_file(&cache, &path).unwrap();

        let mut cursor = MwindowCursor::new();
        for base in [0, WIN, 2 * WIN] {
            cache.open(&file, &mut cursor, base, 16).unwrap();
            cursor.release();
        }

        let stats = cache.stats().unwrap();
        assert_eq!(stats.open_windows, 1);
        assert_eq!(stats.mapped_bytes, WIN);

        // The survivor is the most-recently-used window: positioning on it
        // must not create a new mapping.
        cache.open(&file, &mut cursor, 2 * WIN + 8, 8).unwrap();
        assert_eq!(cache.stats().unwrap().open_windows, 1);
    }

    #[test]
    fn borrowed_windows_are_not_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pack", 3 * WIN as usize);
        let cache = MwindowCache::with_limits(WIN, 2 * WIN, 0);
        let file = MwindowCache::register_file(&cache, &path).unwrap();

        let mut pinned = MwindowCursor::new();
        cache.open(&file, &mut pinned, 0, 16).unwrap();
        let first_byte = pinned.bytes()[0];

        // Drive two more windows through a second cursor; the pinned
        // window must survive and the soft limit may be exceeded.
        let mut cursor = MwindowCursor::new();
        cache.open(&file, &mut cursor, WIN, 16).unwrap();
        cache.open(&file, &mut cursor, 2 * WIN, 16).unwrap();
        cursor.release();

        assert_eq!(pinned.bytes()[0], first_byte);
        let stats = cache.stats().unwrap();
        assert!(stats.open_windows >= 1);

        pinned.release();
    }

    #[test]
    fn mapped_bytes_accounting_balances() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pack", 2 * WIN as usize);
        let cache = MwindowCache::with_limits(WIN, 10 * WIN, 0);

        {
            let file = MwindowCache::register_file(&cache, &path).unwrap();
            let mut cursor = MwindowCursor::new();
            cache.open(&file, &mut cursor, 0, 16).unwrap();
            cache.open(&file, &mut cursor, WIN, 16).unwrap();
            cursor.release();

            let stats = cache.stats().unwrap();
            assert_eq!(stats.mapped_bytes, 2 * WIN);
            assert_eq!(stats.open_windows, 2);
            assert_eq!(stats.peak_open_windows, 2);
        }

        // Deregistration (handle drop) releases everything.
        let stats = cache.stats().unwrap();
        assert_eq!(stats.mapped_bytes, 0);
        assert_eq!(stats.open_windows, 0);
        assert_eq!(stats.open_files, 0);
        assert_eq!(stats.peak_mapped_bytes, 2 * WIN);
    }

    #[test]
    fn file_limit_closes_lru_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.pack", WIN as usize);
        let b = write_file(dir.path(), "b.pack", WIN as usize);
        let c = write_file(dir.path(), "c.pack", WIN as usize);

        let cache = MwindowCache::with_limits(WIN, 10 * WIN, 2);
        let fa = MwindowCache::register_file(&cache, &a).unwrap();
        let _fb = MwindowCache::register_file(&cache, &b).unwrap();
        assert_eq!(cache.stats().unwrap().open_files, 2);

        // Third registration closes the least-recently-used descriptor.
        let _fc = MwindowCache::register_file(&cache, &c).unwrap();
        assert_eq!(cache.stats().unwrap().open_files, 2);

        // The closed file reopens transparently on demand.
        let mut cursor = MwindowCursor::new();
        cache.open(&fa, &mut cursor, 0, 16).unwrap();
        assert_eq!(cursor.bytes()[0], 0);
        cursor.release();
    }

    #[test]
    fn windows_spanning_files_evict_globally() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.pack", WIN as usize);
        let b = write_file(dir.path(), "b.pack", WIN as usize);

        let cache = MwindowCache::with_limits(WIN, 2 * WIN, 0);
        let fa = MwindowCache::register_file(&cache, &a).unwrap();
        let fb = MwindowCache::register_file(&cache, &b).unwrap();

        let mut ca = MwindowCursor::new();
        cache.open(&fa, &mut ca, 0, 16).unwrap();
        ca.release();

        // Opening on the second file evicts the first file's window.
        let mut cb = MwindowCursor::new();
        cache.open(&fb, &mut cb, 0, 16).unwrap();
        cb.release();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.open_windows, 1);
        assert_eq!(stats.mapped_bytes, WIN);
    }
}
