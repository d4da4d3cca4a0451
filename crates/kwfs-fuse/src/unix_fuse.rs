//! Unix FUSE implementation using the `fuser` crate.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::SystemTime;

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use tracing::{debug, error};

use crate::common::{inode_attr_to_file_attr, FsOpError, KeywordFsCore};
use crate::inode::InodeKind;

/// Unix FUSE filesystem wrapper around `KeywordFsCore`.
pub struct UnixFuse(pub KeywordFsCore);

fn utf8(name: &OsStr) -> Result<&str, FsOpError> {
    name.to_str().ok_or(FsOpError::InvalidArg)
}

fn resolve_time(t: TimeOrNow) -> SystemTime {
    match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

impl UnixFuse {
    /// Log a failed request and return its errno. Missing names are routine.
    fn fail(op: &str, e: &FsOpError) -> i32 {
        let errno = e.errno();
        if matches!(e, FsOpError::NotFound) {
            debug!(op, errno, "request failed: {}", e);
        } else {
            error!(op, errno, "request failed: {}", e);
        }
        errno
    }
}

impl Filesystem for UnixFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!(parent, name = ?name, "lookup");

        match utf8(name).and_then(|n| self.0.do_lookup(parent, n)) {
            Ok(attr) => {
                let ttl = self.0.options.attr_ttl;
                reply.entry(&ttl, &inode_attr_to_file_attr(&attr), 0);
            }
            Err(e) => reply.error(Self::fail("lookup", &e)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!(ino, "getattr");

        match self.0.do_getattr(ino) {
            Ok(attr) => {
                let ttl = self.0.options.attr_ttl;
                reply.attr(&ttl, &inode_attr_to_file_attr(&attr));
            }
            Err(e) => reply.error(Self::fail("getattr", &e)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        debug!(ino, "readlink");

        match self.0.do_readlink(ino) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(Self::fail("readlink", &e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        debug!(parent, name = ?name, mode, "mkdir");

        match utf8(name).and_then(|n| self.0.do_mkdir(parent, n, mode & !umask)) {
            Ok(attr) => {
                let ttl = self.0.options.attr_ttl;
                reply.entry(&ttl, &inode_attr_to_file_attr(&attr), 0);
            }
            Err(e) => reply.error(Self::fail("mkdir", &e)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(parent, name = ?name, "unlink");

        match utf8(name).and_then(|n| self.0.do_unlink(parent, n)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("unlink", &e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(parent, name = ?name, "rmdir");

        match utf8(name).and_then(|n| self.0.do_rmdir(parent, n)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("rmdir", &e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(parent, name = ?name, newparent, newname = ?newname, "rename");

        let result = utf8(name).and_then(|n| {
            let newn = utf8(newname)?;
            self.0.do_rename(parent, n, newparent, newn)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("rename", &e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!(ino, flags, "open");

        match self.0.do_open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(Self::fail("open", &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!(ino, fh, offset, size, "read");

        match self.0.do_read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(Self::fail("read", &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!(ino, fh, offset, size = data.len(), "write");

        match self.0.do_write(fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(Self::fail("write", &e)),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        debug!(ino, fh, "flush");

        match self.0.do_flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("flush", &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!(ino, fh, "release");

        match self.0.do_release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("release", &e)),
        }
    }

    fn fsync(&mut self, _req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        debug!(ino, fh, datasync, "fsync");

        match self.0.do_fsync(fh, datasync) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("fsync", &e)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!(ino, "opendir");

        match self.0.do_opendir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(Self::fail("opendir", &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino, offset, "readdir");

        match self.0.do_readdir(ino) {
            Ok(result) => {
                let skip = usize::try_from(offset).unwrap_or(0);
                for (i, entry) in result.entries.into_iter().enumerate().skip(skip) {
                    let ft = match entry.kind {
                        InodeKind::File => FileType::RegularFile,
                        InodeKind::Directory => FileType::Directory,
                        InodeKind::Symlink => FileType::Symlink,
                    };
                    // The offset handed back is where the next call resumes.
                    if reply.add(entry.ino, (i + 1) as i64, ft, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => reply.error(Self::fail("readdir", &e)),
        }
    }

    fn releasedir(&mut self, _req: &Request, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        debug!(ino, "releasedir");
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.0.do_statfs() {
            Ok(st) => reply.statfs(
                st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen,
                st.frsize,
            ),
            Err(e) => reply.error(Self::fail("statfs", &e)),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        debug!(ino, mask, "access");

        match self.0.do_access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::fail("access", &e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        debug!(parent, name = ?name, mode, "create");

        match utf8(name).and_then(|n| self.0.do_create(parent, n, mode & !umask, flags)) {
            Ok((attr, fh)) => {
                let ttl = self.0.options.attr_ttl;
                reply.created(&ttl, &inode_attr_to_file_attr(&attr), 0, fh, 0);
            }
            Err(e) => reply.error(Self::fail("create", &e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(ino, size = ?size, "setattr");

        let atime = atime.map(resolve_time);
        let mtime = mtime.map(resolve_time);
        match self.0.do_setattr(ino, size, atime, mtime, fh) {
            Ok(attr) => {
                let ttl = self.0.options.attr_ttl;
                reply.attr(&ttl, &inode_attr_to_file_attr(&attr));
            }
            Err(e) => reply.error(Self::fail("setattr", &e)),
        }
    }
}
