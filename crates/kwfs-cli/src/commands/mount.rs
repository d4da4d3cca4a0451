//! Mount command for the keywordfs FUSE filesystem.

use std::path::PathBuf;

use kwfs_config::KeywordFsConfig;
use kwfs_fuse::KeywordFuse;

/// Run the mount command. Blocks until the filesystem is unmounted.
pub fn run(config: KeywordFsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.effective();
    config.validate_or_err()?;

    let mountpoint = config
        .mountpoint
        .as_deref()
        .map(PathBuf::from)
        .ok_or("No mount point given. Pass one on the command line or set 'mountpoint'")?;

    if !mountpoint.exists() {
        std::fs::create_dir_all(&mountpoint)?;
    }

    KeywordFuse::from_config(&config)?.mount(&mountpoint)
}
