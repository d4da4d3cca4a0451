//! Request handling shared by the FUSE driver.
//!
//! Each `do_*` method answers one kind of kernel request in terms of the
//! overlay: classify the name, then either synthesize a reply for virtual
//! objects or act on the real path behind it.

use std::ffi::CString;
use std::fs::{File, FileTimes, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kwfs_config::{HumanDuration, KeywordFsConfig, MountSettings, DEFAULT_FS_NAME};
use kwfs_core::{vpath, Classification, KeywordFs, KeywordFsError};
use tracing::{debug, info, warn};

use crate::handles::HandleTable;
use crate::inode::{InodeAttr, InodeKind, InodeTable, ROOT_INO};

/// Errors returned by filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsOpError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// Mutation attempted on a read-only mount.
    #[error("read-only filesystem")]
    ReadOnly,
    /// Structural change the overlay does not allow.
    #[error("operation not permitted")]
    PermissionDenied,
    /// Bad argument (e.g. a name that is not UTF-8).
    #[error("invalid argument")]
    InvalidArg,
    #[error("not a symlink")]
    NotSymlink,
    #[error("is a directory")]
    IsDir,
    /// The file handle is unknown or already released.
    #[error("bad file handle")]
    BadHandle,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FsOpError {
    /// The errno reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsOpError::NotFound => libc::ENOENT,
            FsOpError::AlreadyExists => libc::EEXIST,
            FsOpError::ReadOnly => libc::EROFS,
            FsOpError::PermissionDenied => libc::EPERM,
            FsOpError::InvalidArg => libc::EINVAL,
            FsOpError::NotSymlink => libc::EINVAL,
            FsOpError::IsDir => libc::EISDIR,
            FsOpError::BadHandle => libc::EBADF,
            FsOpError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<KeywordFsError> for FsOpError {
    fn from(e: KeywordFsError) -> Self {
        match e {
            KeywordFsError::NotFound(_) => FsOpError::NotFound,
            KeywordFsError::AlreadyExists(_) => FsOpError::AlreadyExists,
            KeywordFsError::IsDirectory(_) => FsOpError::IsDir,
            KeywordFsError::PermissionDenied(_) => FsOpError::PermissionDenied,
            KeywordFsError::OutsideRoot { .. } => FsOpError::InvalidArg,
            KeywordFsError::Io(e) => FsOpError::Io(e),
            other => FsOpError::Io(io::Error::other(other.to_string())),
        }
    }
}

/// Kernel-facing mount settings with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    pub fs_name: String,
    pub allow_other: bool,
    pub auto_unmount: bool,
    pub read_only: bool,
    /// How long the kernel may cache entries and attributes.
    pub attr_ttl: Duration,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions::from_settings(&MountSettings::default())
    }
}

impl MountOptions {
    pub fn from_settings(settings: &MountSettings) -> Self {
        MountOptions {
            fs_name: settings
                .fs_name
                .clone()
                .unwrap_or_else(|| DEFAULT_FS_NAME.to_string()),
            allow_other: settings.allow_other,
            auto_unmount: settings.auto_unmount,
            read_only: settings.read_only,
            attr_ttl: settings
                .attr_ttl
                .as_ref()
                .map(HumanDuration::as_duration)
                .unwrap_or(Duration::from_secs(1)),
        }
    }

    pub fn to_fuser(&self) -> Vec<fuser::MountOption> {
        use fuser::MountOption;

        let mut options = vec![MountOption::FSName(self.fs_name.clone())];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options.push(if self.read_only {
            MountOption::RO
        } else {
            MountOption::RW
        });
        options
    }
}

/// Filesystem statistics of the reference root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// Result from a readdir operation.
pub struct ReadDirResult {
    /// Inode of the directory being listed.
    pub ino: u64,
    /// Entries in listing order, `.` and `..` included.
    pub entries: Vec<DirEntry>,
}

/// A single directory entry.
pub struct DirEntry {
    pub ino: u64,
    pub name: String,
    pub kind: InodeKind,
}

/// Core FUSE filesystem logic.
pub struct KeywordFsCore {
    /// The keyword overlay.
    pub overlay: Arc<KeywordFs>,
    /// Inode management.
    pub inodes: Arc<InodeTable>,
    /// Open real files.
    pub handles: Arc<HandleTable>,
    pub options: MountOptions,
}

impl KeywordFsCore {
    pub fn new(overlay: Arc<KeywordFs>, options: MountOptions) -> Self {
        KeywordFsCore {
            overlay,
            inodes: Arc::new(InodeTable::new()),
            handles: Arc::new(HandleTable::new()),
            options,
        }
    }

    /// Create a core over the local disk from a config.
    pub fn from_config(config: &KeywordFsConfig) -> Result<Self, KeywordFsError> {
        let overlay = KeywordFs::from_config(config)?;
        let options = MountOptions::from_settings(&config.mount);
        Ok(Self::new(Arc::new(overlay), options))
    }

    /// Get the virtual path for an inode.
    pub fn get_path(&self, ino: u64) -> Option<String> {
        self.inodes.get_path(ino)
    }

    fn path_of(&self, ino: u64) -> Result<String, FsOpError> {
        self.get_path(ino).ok_or(FsOpError::NotFound)
    }

    fn child_of(&self, parent: u64, name: &str) -> Result<(String, String), FsOpError> {
        let parent_path = self.path_of(parent)?;
        let child_path = vpath::join(&parent_path, name);
        Ok((parent_path, child_path))
    }

    fn writable(&self) -> Result<(), FsOpError> {
        if self.options.read_only {
            Err(FsOpError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Attributes for a classified virtual path.
    fn attr_for(&self, path: &str, kind: &Classification) -> Result<InodeAttr, FsOpError> {
        match kind {
            Classification::NotFound => Err(FsOpError::NotFound),
            Classification::VirtualKeyword => {
                Ok(InodeAttr::virtual_dir(self.inodes.get_or_create(path)))
            }
            Classification::LinkMarker(target) => Ok(InodeAttr::link_marker(
                self.inodes.get_or_create(path),
                target.as_os_str().len() as u64,
            )),
            Classification::RealFile(real) | Classification::RealSubdir(real) => {
                let meta = std::fs::symlink_metadata(real)?;
                Ok(InodeAttr::from_metadata(self.inodes.get_or_create(path), &meta))
            }
        }
    }

    /// Perform a lookup operation.
    pub fn do_lookup(&self, parent: u64, name: &str) -> Result<InodeAttr, FsOpError> {
        let (parent_path, child_path) = self.child_of(parent, name)?;
        let kind = self.overlay.classify(&parent_path, name)?;
        self.attr_for(&child_path, &kind)
    }

    /// Perform a getattr operation.
    pub fn do_getattr(&self, ino: u64) -> Result<InodeAttr, FsOpError> {
        if ino == ROOT_INO {
            return Ok(InodeAttr::virtual_dir(ROOT_INO));
        }
        let path = self.path_of(ino)?;
        let kind = self.overlay.classify_path(&path)?;
        self.attr_for(&path, &kind)
    }

    /// List a directory.
    pub fn do_readdir(&self, ino: u64) -> Result<ReadDirResult, FsOpError> {
        let path = self.path_of(ino)?;
        let parent_ino = self.inodes.get_ino(&vpath::parent(&path)).unwrap_or(ROOT_INO);

        let entries = self
            .overlay
            .read_dir(&path)?
            .into_iter()
            .map(|(name, kind)| {
                let (entry_ino, kind) = match name.as_str() {
                    "." => (ino, InodeKind::Directory),
                    ".." => (parent_ino, InodeKind::Directory),
                    _ => {
                        let entry_ino = self.inodes.get_or_create(&vpath::join(&path, &name));
                        let kind = match kind {
                            Classification::LinkMarker(_) => InodeKind::Symlink,
                            Classification::RealFile(real) => real_file_kind(&real),
                            _ => InodeKind::Directory,
                        };
                        (entry_ino, kind)
                    }
                };
                DirEntry {
                    ino: entry_ino,
                    name,
                    kind,
                }
            })
            .collect();

        Ok(ReadDirResult { ino, entries })
    }

    /// Check that a directory inode can be listed.
    pub fn do_opendir(&self, ino: u64) -> Result<(), FsOpError> {
        let path = self.path_of(ino)?;
        let kind = self.overlay.classify_path(&path)?;
        match kind {
            Classification::VirtualKeyword | Classification::RealSubdir(_) => Ok(()),
            Classification::NotFound => Err(FsOpError::NotFound),
            _ => Err(FsOpError::Io(io::Error::from_raw_os_error(libc::ENOTDIR))),
        }
    }

    /// Open a real file and return its handle.
    pub fn do_open(&self, ino: u64, flags: i32) -> Result<u64, FsOpError> {
        let path = self.path_of(ino)?;
        let real = match self.overlay.classify_path(&path)? {
            Classification::RealFile(real) => real,
            Classification::NotFound => return Err(FsOpError::NotFound),
            Classification::LinkMarker(_) => return Err(FsOpError::InvalidArg),
            Classification::VirtualKeyword | Classification::RealSubdir(_) => {
                return Err(FsOpError::IsDir)
            }
        };

        let accmode = flags & libc::O_ACCMODE;
        let write = accmode == libc::O_WRONLY || accmode == libc::O_RDWR;
        if write || flags & libc::O_TRUNC != 0 {
            self.writable()?;
        }

        let file = OpenOptions::new()
            .read(accmode == libc::O_RDONLY || accmode == libc::O_RDWR)
            .write(write)
            .append(flags & libc::O_APPEND != 0)
            .truncate(write && flags & libc::O_TRUNC != 0)
            .open(&real)?;
        let fh = self.handles.insert(file);
        debug!(path = %path, real = %real.display(), fh, "opened file");
        Ok(fh)
    }

    fn handle(&self, fh: u64) -> Result<Arc<File>, FsOpError> {
        self.handles.get(fh).ok_or(FsOpError::BadHandle)
    }

    /// Perform a read operation on an open handle.
    pub fn do_read(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, FsOpError> {
        let file = self.handle(fh)?;
        let offset = u64::try_from(offset).map_err(|_| FsOpError::InvalidArg)?;

        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Perform a write operation on an open handle.
    pub fn do_write(&self, fh: u64, offset: i64, data: &[u8]) -> Result<u32, FsOpError> {
        self.writable()?;
        let file = self.handle(fh)?;
        let offset = u64::try_from(offset).map_err(|_| FsOpError::InvalidArg)?;
        file.write_all_at(data, offset)?;
        Ok(data.len() as u32)
    }

    /// Flush an open handle. Writes are unbuffered, so this only checks it.
    pub fn do_flush(&self, fh: u64) -> Result<(), FsOpError> {
        self.handle(fh).map(|_| ())
    }

    pub fn do_fsync(&self, fh: u64, datasync: bool) -> Result<(), FsOpError> {
        let file = self.handle(fh)?;
        if datasync {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    pub fn do_release(&self, fh: u64) -> Result<(), FsOpError> {
        self.handles.remove(fh).map(|_| ()).ok_or(FsOpError::BadHandle)
    }

    /// Create and open a new file in the parent's canonical directory.
    pub fn do_create(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
        flags: i32,
    ) -> Result<(InodeAttr, u64), FsOpError> {
        self.writable()?;
        let (parent_path, child_path) = self.child_of(parent, name)?;
        if self.overlay.classify(&parent_path, name)?.exists() {
            return Err(FsOpError::AlreadyExists);
        }

        let real = self.overlay.real_child_path(&child_path)?;
        let accmode = flags & libc::O_ACCMODE;
        let file = OpenOptions::new()
            .read(accmode != libc::O_WRONLY)
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&real)?;
        self.overlay.on_create_file(&child_path);

        let meta = file.metadata()?;
        let attr = InodeAttr::from_metadata(self.inodes.get_or_create(&child_path), &meta);
        let fh = self.handles.insert(file);
        debug!(path = %child_path, real = %real.display(), fh, "created file");
        Ok((attr, fh))
    }

    /// Create a new directory, tagging it in the overlay.
    pub fn do_mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<InodeAttr, FsOpError> {
        self.writable()?;
        let (_, child_path) = self.child_of(parent, name)?;
        let real = self.overlay.create_dir(&child_path, mode)?;
        let meta = std::fs::symlink_metadata(&real)?;
        Ok(InodeAttr::from_metadata(self.inodes.get_or_create(&child_path), &meta))
    }

    /// Delete a real file.
    pub fn do_unlink(&self, parent: u64, name: &str) -> Result<(), FsOpError> {
        self.writable()?;
        let (parent_path, child_path) = self.child_of(parent, name)?;
        match self.overlay.classify(&parent_path, name)? {
            Classification::RealFile(real) => {
                std::fs::remove_file(&real)?;
                self.overlay.on_remove_file(&child_path);
                self.inodes.remove_path(&child_path);
                Ok(())
            }
            Classification::NotFound => Err(FsOpError::NotFound),
            Classification::LinkMarker(_) => Err(FsOpError::PermissionDenied),
            Classification::VirtualKeyword | Classification::RealSubdir(_) => {
                Err(FsOpError::IsDir)
            }
        }
    }

    /// Remove a directory, untagging it in the overlay.
    pub fn do_rmdir(&self, parent: u64, name: &str) -> Result<(), FsOpError> {
        self.writable()?;
        let (_, child_path) = self.child_of(parent, name)?;
        self.overlay.remove_dir(&child_path)?;
        self.inodes.remove_path(&child_path);
        Ok(())
    }

    /// Read a symlink target: the canonical directory for the escape link,
    /// the stored target for real symlinks.
    pub fn do_readlink(&self, ino: u64) -> Result<PathBuf, FsOpError> {
        let path = self.path_of(ino)?;
        match self.overlay.classify_path(&path)? {
            Classification::LinkMarker(target) => Ok(target),
            Classification::RealFile(real) => std::fs::read_link(&real).map_err(|e| {
                if e.raw_os_error() == Some(libc::EINVAL) {
                    FsOpError::NotSymlink
                } else {
                    e.into()
                }
            }),
            Classification::NotFound => Err(FsOpError::NotFound),
            _ => Err(FsOpError::NotSymlink),
        }
    }

    /// Check access to an inode.
    ///
    /// Real objects are checked against `mask` on disk; virtual objects
    /// and the escape link only need to resolve.
    pub fn do_access(&self, ino: u64, mask: i32) -> Result<(), FsOpError> {
        if ino == ROOT_INO {
            return Ok(());
        }
        let path = self.path_of(ino)?;
        match self.overlay.classify_path(&path)? {
            Classification::RealFile(real) | Classification::RealSubdir(real) => {
                check_access(&real, mask)
            }
            Classification::NotFound => Err(FsOpError::NotFound),
            Classification::VirtualKeyword | Classification::LinkMarker(_) => Ok(()),
        }
    }

    /// Handle setattr: truncation and access/modification times.
    ///
    /// Synthetic objects accept no changes.
    pub fn do_setattr(
        &self,
        ino: u64,
        size: Option<u64>,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
        fh: Option<u64>,
    ) -> Result<InodeAttr, FsOpError> {
        let changes = size.is_some() || atime.is_some() || mtime.is_some();
        if !changes {
            return self.do_getattr(ino);
        }
        self.writable()?;

        let path = self.path_of(ino)?;
        let kind = if ino == ROOT_INO {
            Classification::VirtualKeyword
        } else {
            self.overlay.classify_path(&path)?
        };
        if size.is_some() && kind == Classification::VirtualKeyword {
            return Err(FsOpError::IsDir);
        }
        let real = match &kind {
            Classification::RealFile(real) | Classification::RealSubdir(real) => real,
            Classification::NotFound => return Err(FsOpError::NotFound),
            _ => return Err(FsOpError::PermissionDenied),
        };

        if let Some(size) = size {
            if !matches!(kind, Classification::RealFile(_)) {
                return Err(FsOpError::IsDir);
            }
            match fh.and_then(|fh| self.handles.get(fh)) {
                Some(file) => file.set_len(size)?,
                None => OpenOptions::new().write(true).open(real)?.set_len(size)?,
            }
            debug!(path = %path, size, "truncated file");
        }

        if atime.is_some() || mtime.is_some() {
            let mut times = FileTimes::new();
            if let Some(t) = atime {
                times = times.set_accessed(t);
            }
            if let Some(t) = mtime {
                times = times.set_modified(t);
            }
            File::open(real)?.set_times(times)?;
        }

        self.attr_for(&path, &kind)
    }

    /// Rename a real file. Directories and synthetic objects stay put.
    pub fn do_rename(
        &self,
        parent: u64,
        name: &str,
        newparent: u64,
        newname: &str,
    ) -> Result<(), FsOpError> {
        self.writable()?;
        let (parent_path, src_path) = self.child_of(parent, name)?;
        let (newparent_path, dst_path) = self.child_of(newparent, newname)?;

        let src = match self.overlay.classify(&parent_path, name)? {
            Classification::RealFile(real) => real,
            Classification::NotFound => return Err(FsOpError::NotFound),
            _ => return Err(FsOpError::PermissionDenied),
        };
        match self.overlay.classify(&newparent_path, newname)? {
            Classification::RealFile(_) | Classification::NotFound => {}
            Classification::LinkMarker(_) => return Err(FsOpError::PermissionDenied),
            Classification::VirtualKeyword | Classification::RealSubdir(_) => {
                return Err(FsOpError::IsDir)
            }
        }

        let dst = self.overlay.real_child_path(&dst_path)?;
        std::fs::rename(&src, &dst)?;
        self.overlay.on_remove_file(&src_path);
        self.overlay.on_create_file(&dst_path);
        self.inodes.rename_path(&src_path, &dst_path);
        debug!(from = %src.display(), to = %dst.display(), "renamed file");
        Ok(())
    }

    /// Filesystem statistics of the reference root.
    pub fn do_statfs(&self) -> Result<StatFs, FsOpError> {
        statvfs(self.overlay.reference_root())
    }

    /// Mount the filesystem and serve requests until it is unmounted.
    ///
    /// The reference tree is rescanned first.
    pub fn mount(self, mountpoint: &Path) -> Result<(), Box<dyn std::error::Error>> {
        use crate::unix_fuse::UnixFuse;

        let added = self.overlay.rescan()?;
        if added > 0 {
            warn!(added, "reference tree changed since the overlay was built");
        }

        let options = self.options.to_fuser();
        info!(
            mountpoint = %mountpoint.display(),
            root = %self.overlay.reference_root().display(),
            directories = self.overlay.directory_count(),
            keywords = self.overlay.keyword_count(),
            "mounting keywordfs"
        );
        fuser::mount2(UnixFuse(self), mountpoint, &options)?;
        info!(mountpoint = %mountpoint.display(), "keywordfs unmounted");

        Ok(())
    }
}

/// `File` or `Symlink`, matching what getattr reports for the same entry.
fn real_file_kind(real: &Path) -> InodeKind {
    match std::fs::symlink_metadata(real) {
        Ok(meta) if meta.file_type().is_symlink() => InodeKind::Symlink,
        _ => InodeKind::File,
    }
}

fn check_access(path: &Path, mask: i32) -> Result<(), FsOpError> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| FsOpError::InvalidArg)?;
    if unsafe { libc::access(c_path.as_ptr(), mask) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

#[allow(clippy::unnecessary_cast)]
fn statvfs(path: &Path) -> Result<StatFs, FsOpError> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| FsOpError::InvalidArg)?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut st) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(StatFs {
        blocks: st.f_blocks as u64,
        bfree: st.f_bfree as u64,
        bavail: st.f_bavail as u64,
        files: st.f_files as u64,
        ffree: st.f_ffree as u64,
        bsize: st.f_bsize as u32,
        namelen: st.f_namemax as u32,
        frsize: st.f_frsize as u32,
    })
}

/// Convert an `InodeAttr` to the `fuser` representation.
pub fn inode_attr_to_file_attr(attr: &InodeAttr) -> fuser::FileAttr {
    use fuser::{FileAttr, FileType};

    let kind = match attr.kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
        InodeKind::Symlink => FileType::Symlink,
    };

    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.crtime,
        kind,
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
