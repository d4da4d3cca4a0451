use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::realfs::{RealEntry, RealFs};

/// In-memory `RealFs`, handy for tests that need exact path lengths.
///
/// Holds a flat map of absolute path -> "is a directory".
pub struct MemoryFs {
    tree: RwLock<BTreeMap<PathBuf, bool>>,
}

impl MemoryFs {
    /// Create a tree containing only the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut tree = BTreeMap::new();
        tree.insert(root.as_ref().to_path_buf(), true);
        MemoryFs {
            tree: RwLock::new(tree),
        }
    }

    /// Add a directory and any missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        let mut tree = self.tree.write();
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            tree.entry(ancestor.to_path_buf()).or_insert(true);
        }
        self
    }

    /// Add a file, creating any missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>) -> &Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.tree.write().insert(path.to_path_buf(), false);
        self
    }

    /// Remove a file.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut tree = self.tree.write();
        match tree.get(path.as_ref()) {
            Some(false) => {
                tree.remove(path.as_ref());
                Ok(())
            }
            Some(true) => Err(io::Error::new(io::ErrorKind::IsADirectory, "is a directory")),
            None => Err(not_found(path.as_ref())),
        }
    }

    /// Whether the path exists, and as what.
    pub fn is_dir(&self, path: impl AsRef<Path>) -> Option<bool> {
        self.tree.read().get(path.as_ref()).copied()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

impl RealFs for MemoryFs {
    fn list(&self, path: &Path) -> io::Result<Vec<RealEntry>> {
        let tree = self.tree.read();
        match tree.get(path) {
            Some(true) => {}
            Some(false) => {
                return Err(io::Error::new(io::ErrorKind::NotADirectory, "not a directory"))
            }
            None => return Err(not_found(path)),
        }

        // BTreeMap order keeps the listing sorted by name.
        let entries = tree
            .range(path.to_path_buf()..)
            .skip(1)
            .take_while(|(p, _)| p.starts_with(path))
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, is_dir)| {
                let name = p.file_name()?.to_str()?.to_string();
                Some(RealEntry { name, is_dir: *is_dir })
            })
            .collect();
        Ok(entries)
    }

    fn create_dir(&self, path: &Path, _mode: u32) -> io::Result<()> {
        let mut tree = self.tree.write();
        if tree.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "already exists"));
        }
        let parent = path.parent().ok_or_else(|| not_found(path))?;
        match tree.get(parent) {
            Some(true) => {
                tree.insert(path.to_path_buf(), true);
                Ok(())
            }
            Some(false) => Err(io::Error::new(io::ErrorKind::NotADirectory, "not a directory")),
            None => Err(not_found(parent)),
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree.write();
        match tree.get(path) {
            Some(true) => {}
            Some(false) => {
                return Err(io::Error::new(io::ErrorKind::NotADirectory, "not a directory"))
            }
            None => return Err(not_found(path)),
        }
        let has_children = tree.keys().any(|p| p.parent() == Some(path));
        if has_children {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                "directory not empty",
            ));
        }
        tree.remove(path);
        Ok(())
    }
}
