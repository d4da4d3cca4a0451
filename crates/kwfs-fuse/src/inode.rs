//! Inode management for the FUSE adapter.
//!
//! Maps inode numbers to virtual paths and back. The same real directory
//! reached through two virtual paths gets two inodes; attributes are not
//! stored here but rebuilt from the overlay on every request.

use std::collections::HashMap;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kwfs_core::vpath;
use parking_lot::RwLock;

/// Reserved inode for the mount root.
pub const ROOT_INO: u64 = 1;

/// Inode attributes matching FUSE requirements.
#[derive(Debug, Clone)]
pub struct InodeAttr {
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Number of 512-byte blocks.
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
    pub kind: InodeKind,
    /// Permission bits.
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Type of inode (file, directory, or symlink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
    Symlink,
}

fn owner() -> (u32, u32) {
    unsafe { (libc::getuid(), libc::getgid()) }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH
    }
}

impl InodeAttr {
    /// Attributes for an object with no real counterpart, owned by the
    /// mounting user and stamped with the current time.
    fn synthetic(ino: u64, kind: InodeKind, size: u64, perm: u16) -> Self {
        let now = SystemTime::now();
        let (uid, gid) = owner();
        let dir = kind == InodeKind::Directory;
        InodeAttr {
            ino,
            size,
            blocks: if dir { 8 } else { 0 },
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm,
            nlink: if dir { 2 } else { 1 },
            uid,
            gid,
        }
    }

    /// A synthetic directory: the root or a keyword. Private to the
    /// mounting user.
    pub fn virtual_dir(ino: u64) -> Self {
        Self::synthetic(ino, InodeKind::Directory, 4096, 0o700)
    }

    /// The escape link, whose target is `target_len` bytes long.
    pub fn link_marker(ino: u64, target_len: u64) -> Self {
        Self::synthetic(ino, InodeKind::Symlink, target_len, 0o400)
    }

    /// Attributes of a real object, taken from its (unfollowed) metadata.
    pub fn from_metadata(ino: u64, meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            InodeKind::Directory
        } else if file_type.is_symlink() {
            InodeKind::Symlink
        } else {
            InodeKind::File
        };
        let mtime = unix_time(meta.mtime(), meta.mtime_nsec());

        InodeAttr {
            ino,
            size: meta.size(),
            blocks: meta.blocks(),
            atime: unix_time(meta.atime(), meta.atime_nsec()),
            mtime,
            ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
            crtime: meta.created().unwrap_or(mtime),
            kind,
            perm: (meta.mode() & 0o7777) as u16,
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

#[derive(Default)]
struct Maps {
    by_path: HashMap<String, u64>,
    by_ino: HashMap<u64, String>,
}

impl Maps {
    fn bind(&mut self, path: String, ino: u64) {
        self.by_ino.insert(ino, path.clone());
        self.by_path.insert(path, ino);
    }

    fn unbind_path(&mut self, path: &str) -> Option<u64> {
        let ino = self.by_path.remove(path)?;
        self.by_ino.remove(&ino);
        Some(ino)
    }
}

/// Virtual path <-> inode number, both directions under one lock.
pub struct InodeTable {
    maps: RwLock<Maps>,
    next_ino: AtomicU64,
}

impl InodeTable {
    /// Create a table with only the root bound.
    pub fn new() -> Self {
        let mut maps = Maps::default();
        maps.bind("/".to_string(), ROOT_INO);
        InodeTable {
            maps: RwLock::new(maps),
            next_ino: AtomicU64::new(ROOT_INO + 1),
        }
    }

    /// Get or allocate the inode of a virtual path.
    pub fn get_or_create(&self, path: &str) -> u64 {
        let normalized = vpath::normalize(path);
        if let Some(&ino) = self.maps.read().by_path.get(&normalized) {
            return ino;
        }

        let mut maps = self.maps.write();
        // Another thread may have won the race since the read lock dropped.
        if let Some(&ino) = maps.by_path.get(&normalized) {
            return ino;
        }
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        maps.bind(normalized, ino);
        ino
    }

    pub fn get_ino(&self, path: &str) -> Option<u64> {
        self.maps.read().by_path.get(&vpath::normalize(path)).copied()
    }

    pub fn get_path(&self, ino: u64) -> Option<String> {
        self.maps.read().by_ino.get(&ino).cloned()
    }

    /// Forget a path. The root is never forgotten.
    pub fn remove_path(&self, path: &str) {
        let normalized = vpath::normalize(path);
        if normalized != "/" {
            self.maps.write().unbind_path(&normalized);
        }
    }

    /// Move an inode to a new path, dropping whatever the new path had.
    pub fn rename_path(&self, from: &str, to: &str) {
        let from = vpath::normalize(from);
        let to = vpath::normalize(to);
        if from == to {
            return;
        }
        let mut maps = self.maps.write();
        maps.unbind_path(&to);
        if let Some(ino) = maps.unbind_path(&from) {
            maps.bind(to, ino);
        }
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_ino.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_virtual_dir_attr() {
        let attr = InodeAttr::virtual_dir(42);
        assert_eq!(attr.ino, 42);
        assert_eq!(attr.kind, InodeKind::Directory);
        assert_eq!(attr.perm, 0o700);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.uid, unsafe { libc::getuid() });
    }

    #[test]
    fn test_link_marker_attr() {
        let attr = InodeAttr::link_marker(7, 25);
        assert_eq!(attr.kind, InodeKind::Symlink);
        assert_eq!(attr.perm, 0o400);
        assert_eq!(attr.size, 25);
    }

    #[test]
    fn test_attr_from_metadata() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("data.bin");
        std::fs::write(&file, vec![0u8; 1000]).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&file, &link).unwrap();

        let attr = InodeAttr::from_metadata(3, &std::fs::symlink_metadata(&file).unwrap());
        assert_eq!(attr.kind, InodeKind::File);
        assert_eq!(attr.size, 1000);
        assert_eq!(attr.ino, 3);

        let attr = InodeAttr::from_metadata(4, &std::fs::symlink_metadata(tmp.path()).unwrap());
        assert_eq!(attr.kind, InodeKind::Directory);

        let attr = InodeAttr::from_metadata(5, &std::fs::symlink_metadata(&link).unwrap());
        assert_eq!(attr.kind, InodeKind::Symlink);
    }

    #[test]
    fn test_root_registered() {
        let table = InodeTable::new();
        assert_eq!(table.get_path(ROOT_INO), Some("/".to_string()));
        assert_eq!(table.get_ino("/"), Some(ROOT_INO));
        assert_eq!(table.get_or_create(""), ROOT_INO);
    }

    #[test]
    fn test_inodes_are_stable() {
        let table = InodeTable::new();
        let a = table.get_or_create("/urgent/proj1");
        let b = table.get_or_create("/urgent/proj1/");
        let c = table.get_or_create("/proj1/urgent");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get_path(a), Some("/urgent/proj1".to_string()));
    }

    #[test]
    fn test_remove_path() {
        let table = InodeTable::new();
        let ino = table.get_or_create("/a/file.txt");
        table.remove_path("/a/file.txt");

        assert_eq!(table.get_path(ino), None);
        assert_eq!(table.get_ino("/a/file.txt"), None);

        table.remove_path("/");
        assert_eq!(table.get_path(ROOT_INO), Some("/".to_string()));
    }

    #[test]
    fn test_rename_path_keeps_inode() {
        let table = InodeTable::new();
        let src = table.get_or_create("/a/old.txt");
        let dst = table.get_or_create("/b/new.txt");

        table.rename_path("/a/old.txt", "/b/new.txt");
        assert_eq!(table.get_ino("/b/new.txt"), Some(src));
        assert_eq!(table.get_ino("/a/old.txt"), None);
        assert_eq!(table.get_path(dst), None);
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let table = Arc::new(InodeTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (0..100)
                        .map(|j| table.get_or_create(&format!("/k{}", j)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(other, &results[0]);
        }
        assert_eq!(table.len(), 101);
    }
}
