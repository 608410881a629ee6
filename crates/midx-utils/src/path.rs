use bstr::{BStr, BString, ByteSlice, ByteVec};

use crate::error::UtilError;
use crate::Result;

/// A separator-normalized path (always forward slashes, no trailing slash
/// unless root, no redundant slash runs).
///
/// Pack directories and pack file names are byte strings that are not
/// guaranteed to be valid UTF-8; this type keeps them as such while
/// providing the manipulation the writer needs: resolving an `.idx`
/// argument against the pack directory and deriving the directory-relative
/// name stored in the multi-pack-index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalPath(BString);

/// Check if a byte is a directory separator (handles both Unix and Windows).
#[inline]
fn is_dir_sep(c: u8) -> bool {
    c == b'/' || c == b'\\'
}

impl NormalPath {
    /// Create from a byte slice, normalizing separators to forward slashes,
    /// collapsing separator runs, and removing trailing slashes (unless the
    /// path is just "/").
    pub fn new(path: impl AsRef<[u8]>) -> Self {
        let path = path.as_ref();
        let mut normalized = BString::new(Vec::with_capacity(path.len()));

        for &b in path {
            if is_dir_sep(b) {
                if normalized.last() != Some(&b'/') {
                    normalized.push_byte(b'/');
                }
            } else {
                normalized.push_byte(b);
            }
        }

        while normalized.len() > 1 && normalized.last() == Some(&b'/') {
            normalized.pop();
        }

        NormalPath(normalized)
    }

    /// Get the raw bytes of this path.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }

    /// Check if the path is absolute (Unix root or a Windows drive prefix).
    pub fn is_absolute(&self) -> bool {
        let bytes = self.0.as_bytes();
        if bytes.first() == Some(&b'/') {
            return true;
        }
        bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && bytes[2] == b'/'
    }

    /// Join with a further component, '/' separated. An absolute `other`
    /// replaces `self`.
    pub fn join(&self, other: impl AsRef<[u8]>) -> NormalPath {
        let other = NormalPath::new(other);
        if other.0.is_empty() {
            return self.clone();
        }
        if other.is_absolute() || self.0.is_empty() {
            return other;
        }

        let mut result = self.0.clone();
        if result.last() != Some(&b'/') {
            result.push_byte(b'/');
        }
        result.push_str(other.0.as_bytes());
        NormalPath(result)
    }

    /// The filename portion (everything after the last '/').
    pub fn basename(&self) -> &BStr {
        let bytes = self.0.as_bytes();
        match bytes.iter().rposition(|&b| b == b'/') {
            Some(pos) => BStr::new(&bytes[pos + 1..]),
            None => BStr::new(bytes),
        }
    }

    /// The directory portion (like dirname). "." if there is none.
    pub fn dirname(&self) -> &BStr {
        let bytes = self.0.as_bytes();
        match bytes.iter().rposition(|&b| b == b'/') {
            Some(0) => BStr::new(b"/"),
            Some(pos) => BStr::new(&bytes[..pos]),
            None => BStr::new(b"."),
        }
    }

    /// Resolve `.` and `..` components. Errors if `..` escapes the root of
    /// an absolute path.
    pub fn normalize(&self) -> Result<NormalPath> {
        let bytes = self.0.as_bytes();
        let is_absolute = self.is_absolute();
        let mut components: Vec<&[u8]> = Vec::new();

        for component in bytes.split(|&b| b == b'/') {
            match component {
                b"" | b"." => continue,
                b".." => {
                    if components.is_empty() || components.last() == Some(&(b".." as &[u8])) {
                        if is_absolute {
                            return Err(UtilError::Path(
                                "cannot normalize path above root".into(),
                            ));
                        }
                        components.push(b"..");
                    } else {
                        components.pop();
                    }
                }
                other => components.push(other),
            }
        }

        let mut result = BString::new(Vec::new());
        if bytes.first() == Some(&b'/') {
            result.push_byte(b'/');
        }
        for (i, component) in components.iter().enumerate() {
            if i > 0 {
                result.push_byte(b'/');
            }
            result.push_str(component);
        }

        if result.is_empty() || result.as_bytes() == b"/" {
            if is_absolute {
                return Ok(NormalPath::new(b"/" as &[u8]));
            }
            return Ok(NormalPath::new(b"." as &[u8]));
        }
        Ok(NormalPath(result))
    }

    /// Resolve a possibly-relative path against `base` and normalize it.
    pub fn prettify(path: impl AsRef<[u8]>, base: &NormalPath) -> Result<NormalPath> {
        let path = NormalPath::new(path);
        if path.is_absolute() {
            path.normalize()
        } else {
            base.join(path.as_bytes()).normalize()
        }
    }

    /// Express this path relative to `base`, using `..` components where
    /// needed. Both paths should be normalized; mixing absolute and
    /// relative paths is an error.
    pub fn make_relative(&self, base: &NormalPath) -> Result<NormalPath> {
        if self.is_absolute() != base.is_absolute() {
            return Err(UtilError::Path(format!(
                "cannot relativize '{}' against '{}'",
                self.0, base.0
            )));
        }

        let own: Vec<&[u8]> = components(self.0.as_bytes());
        let other: Vec<&[u8]> = components(base.0.as_bytes());

        let common = own
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut result = BString::new(Vec::new());
        for _ in common..other.len() {
            if !result.is_empty() {
                result.push_byte(b'/');
            }
            result.push_str(b"..");
        }
        for component in &own[common..] {
            if !result.is_empty() {
                result.push_byte(b'/');
            }
            result.push_str(component);
        }

        if result.is_empty() {
            return Ok(NormalPath::new(b"." as &[u8]));
        }
        Ok(NormalPath(result))
    }

    /// Convert to a platform-native OS path for file system operations.
    pub fn to_os_path(&self) -> std::path::PathBuf {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            std::path::PathBuf::from(std::ffi::OsStr::from_bytes(self.0.as_bytes()))
        }
        #[cfg(not(unix))]
        {
            let s = self.0.to_str_lossy();
            std::path::PathBuf::from(s.replace('/', "\\"))
        }
    }
}

fn components(bytes: &[u8]) -> Vec<&[u8]> {
    bytes.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect()
}

impl std::fmt::Display for NormalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&std::path::Path> for NormalPath {
    fn from(p: &std::path::Path) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            NormalPath::new(p.as_os_str().as_bytes())
        }
        #[cfg(not(unix))]
        {
            NormalPath::new(p.to_string_lossy().as_bytes())
        }
    }
}
