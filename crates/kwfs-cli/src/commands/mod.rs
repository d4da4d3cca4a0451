pub mod config;
pub mod ls;
#[cfg(feature = "fuse")]
pub mod mount;
#[cfg(not(feature = "fuse"))]
pub mod mount {
    use kwfs_config::KeywordFsConfig;

    /// Run the mount command when FUSE support is disabled.
    pub fn run(_config: KeywordFsConfig) -> Result<(), Box<dyn std::error::Error>> {
        Err("FUSE support is disabled in this build. Rebuild kwfs-cli with --features fuse.".into())
    }
}
pub mod resolve;
pub mod tags;
pub mod unmount;
