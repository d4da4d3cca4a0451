use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument, warn};

/// One child of a real directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealEntry {
    /// File name of the child.
    pub name: String,
    /// Whether the child is itself a directory (symlinks are not followed).
    pub is_dir: bool,
}

impl RealEntry {
    pub fn file(name: impl Into<String>) -> Self {
        RealEntry {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        RealEntry {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// The storage primitives the resolver depends on.
///
/// Calls are synchronous and may block for as long as the storage does.
/// Errors are returned unchanged to whoever triggered the call.
pub trait RealFs: Send + Sync + 'static {
    /// List the children of a real directory, ordered by name.
    fn list(&self, path: &Path) -> io::Result<Vec<RealEntry>>;

    /// Create a single real directory.
    fn create_dir(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Remove a single, empty, real directory.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
}

/// `RealFs` over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl RealFs for LocalFs {
    #[instrument(level = "trace", skip(self), fields(path = %path.display()))]
    fn list(&self, path: &Path) -> io::Result<Vec<RealEntry>> {
        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(path)? {
            let dirent = dirent?;
            let name = match dirent.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, dir = %path.display(), "skipping non UTF-8 name");
                    continue;
                }
            };
            let is_dir = dirent.file_type()?.is_dir();
            entries.push(RealEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir(&self, path: &Path, mode: u32) -> io::Result<()> {
        debug!(path = %path.display(), mode, "creating directory");
        let mut builder = std::fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        debug!(path = %path.display(), "removing directory");
        std::fs::remove_dir(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_sorted_with_kinds() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("zeta")).unwrap();
        std::fs::write(tmp.path().join("alpha.txt"), b"a").unwrap();
        std::fs::create_dir(tmp.path().join("beta")).unwrap();

        let entries = LocalFs.list(tmp.path()).unwrap();
        assert_eq!(
            entries,
            vec![
                RealEntry::file("alpha.txt"),
                RealEntry::dir("beta"),
                RealEntry::dir("zeta"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_dir_is_not_a_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("loop")).unwrap();

        let entries = LocalFs.list(tmp.path()).unwrap();
        assert!(entries.contains(&RealEntry::file("loop")));
        assert!(entries.contains(&RealEntry::dir("real")));
    }

    #[test]
    fn test_create_and_remove_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("made");

        LocalFs.create_dir(&dir, 0o755).unwrap();
        assert!(dir.is_dir());

        let err = LocalFs.create_dir(&dir, 0o755).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        LocalFs.remove_dir(&dir).unwrap();
        assert!(!dir.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_list_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(OsStr::from_bytes(b"bad\xffdir"))).unwrap();
        std::fs::write(tmp.path().join(OsStr::from_bytes(b"bad\xfe.txt")), b"x").unwrap();
        std::fs::write(tmp.path().join("good.txt"), b"x").unwrap();

        let entries = LocalFs.list(tmp.path()).unwrap();
        assert_eq!(entries, vec![RealEntry::file("good.txt")]);
    }

    #[test]
    fn test_list_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let err = LocalFs.list(&tmp.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
