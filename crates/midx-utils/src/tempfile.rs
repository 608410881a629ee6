use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::Result;

/// A temporary file with RAII cleanup.
///
/// The temporary file is created in the same directory as the target path
/// so the final rename stays on one filesystem. It is deleted on drop
/// unless it has been persisted.
pub struct TempFile {
    inner: Option<::tempfile::NamedTempFile>,
}

impl TempFile {
    /// Create a new temporary file in the given directory with a unique name.
    pub fn new_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let named = ::tempfile::NamedTempFile::new_in(dir)?;
        Ok(Self { inner: Some(named) })
    }

    /// Create a new temporary file alongside the given target path.
    pub fn new_for(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref();
        let dir = target.parent().unwrap_or(Path::new("."));
        Self::new_in(dir)
    }

    /// Get the path of the temporary file.
    pub fn path(&self) -> &Path {
        self.inner.as_ref().map(|n| n.path()).unwrap_or(Path::new(""))
    }

    /// Apply `mode` to the file (no-op off Unix).
    pub fn set_mode(&self, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(self.path(), fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
        }
        Ok(())
    }

    /// Persist the temporary file by renaming it to the target path,
    /// replacing whatever was there. Consumes the TempFile.
    pub fn persist(mut self, target: impl AsRef<Path>) -> Result<()> {
        if let Some(named) = self.inner.take() {
            // An existing read-only target would make the rename fail on
            // some platforms; clear it first.
            let target = target.as_ref();
            if target.exists() {
                let _ = fs::remove_file(target);
            }
            named
                .persist(target)
                .map_err(|e| crate::error::UtilError::Io(e.error))?;
        }
        Ok(())
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already closed"))?
            .flush()
    }
}

/// Write `bytes` to `target` atomically: a temp file in the same directory
/// receives the content and `mode`, is flushed, then renamed over `target`.
/// After a crash either the previous file or the new one is visible.
pub fn write_atomic(target: impl AsRef<Path>, bytes: &[u8], mode: u32) -> Result<()> {
    let target = target.as_ref();
    let mut tmp = TempFile::new_for(target)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.set_mode(mode)?;
    tmp.persist(target)
}
