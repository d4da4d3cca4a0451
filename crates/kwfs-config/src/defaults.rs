use crate::types::{HumanDuration, KeywordFsConfig, DEFAULT_FS_NAME, DEFAULT_LINK_MARKER};

impl KeywordFsConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        if self.link_marker.is_none() {
            self.link_marker = Some(DEFAULT_LINK_MARKER.to_string());
        }

        if self.mount.fs_name.is_none() {
            self.mount.fs_name = Some(DEFAULT_FS_NAME.to_string());
        }

        if self.mount.attr_ttl.is_none() {
            self.mount.attr_ttl = Some(HumanDuration::default());
        }

        if let Some(root) = self.reference_root.as_mut() {
            trim_trailing_slash(root);
        }
        if let Some(mountpoint) = self.mountpoint.as_mut() {
            trim_trailing_slash(mountpoint);
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> KeywordFsConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }

    /// Let command-line values take precedence over the file.
    pub fn with_overrides(
        mut self,
        reference_root: Option<String>,
        mountpoint: Option<String>,
    ) -> KeywordFsConfig {
        if reference_root.is_some() {
            self.reference_root = reference_root;
        }
        if mountpoint.is_some() {
            self.mountpoint = mountpoint;
        }
        self
    }
}

/// `/data/tree/` -> `/data/tree`; `/` stays `/`.
fn trim_trailing_slash(path: &mut String) {
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
}
