//! FUSE adapter for the keywordfs overlay.
//!
//! Binds [`kwfs_core::KeywordFs`] to the kernel through `fuser`. Lookups,
//! attributes and listings come from the overlay's resolution; file data
//! is read and written directly on the real paths it resolves to.
//!
//! # Architecture
//!
//! - `common`: `KeywordFsCore`, one `do_*` method per filesystem request
//! - `inode`: stable inode numbers for virtual paths and attribute records
//! - `handles`: open real files, addressed by FUSE file handle
//! - `unix_fuse`: the `fuser::Filesystem` impl that forwards to the core
//!
//! # Example
//!
//! ```ignore
//! use kwfs_fuse::KeywordFuse;
//!
//! let config = kwfs_config::KeywordFsConfig::from_file("keywordfs.yaml".as_ref())?;
//! KeywordFuse::from_config(&config)?.mount("/mnt/tags".as_ref())?;
//! ```

#[cfg(unix)]
mod common;
#[cfg(unix)]
mod handles;
#[cfg(unix)]
mod inode;
#[cfg(unix)]
mod unix_fuse;

#[cfg(unix)]
pub use common::{DirEntry, FsOpError, KeywordFsCore, MountOptions, ReadDirResult, StatFs};
#[cfg(unix)]
pub use handles::HandleTable;
#[cfg(unix)]
pub use inode::{InodeAttr, InodeKind, InodeTable, ROOT_INO};
#[cfg(unix)]
pub use unix_fuse::UnixFuse;

/// The mountable filesystem type.
#[cfg(unix)]
pub type KeywordFuse = KeywordFsCore;
