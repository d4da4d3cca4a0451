use std::path::{Component, Path};

use crate::types::KeywordFsConfig;
use crate::ConfigError;

impl KeywordFsConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        match self.reference_root.as_deref() {
            None => errors.push(ConfigError::MissingReferenceRoot),
            Some(root) => {
                if let Err(reason) = check_absolute(root) {
                    errors.push(ConfigError::InvalidPath(root.to_string(), reason));
                }
            }
        }

        if let Some(mountpoint) = self.mountpoint.as_deref() {
            if let Err(reason) = check_absolute(mountpoint) {
                errors.push(ConfigError::InvalidPath(mountpoint.to_string(), reason));
            } else if let Some(root) = self.reference_root.as_deref() {
                // A mount inside the mirrored tree would be scanned into itself.
                if Path::new(mountpoint).starts_with(root) {
                    errors.push(ConfigError::MountInsideReference(
                        mountpoint.to_string(),
                        root.to_string(),
                    ));
                }
            }
        }

        let marker = self.link_marker();
        if marker.is_empty() {
            errors.push(ConfigError::InvalidLinkMarker(
                marker.to_string(),
                "must not be empty".to_string(),
            ));
        } else if marker.contains('/') || marker.contains('\0') {
            errors.push(ConfigError::InvalidLinkMarker(
                marker.to_string(),
                "must be a single path component".to_string(),
            ));
        } else if marker == "." || marker == ".." {
            errors.push(ConfigError::InvalidLinkMarker(
                marker.to_string(),
                "must not be '.' or '..'".to_string(),
            ));
        }

        if let Some(ttl) = &self.mount.attr_ttl {
            if ttl.as_duration().as_secs() > 3600 {
                errors.push(ConfigError::InvalidConfig(format!(
                    "mount.attr_ttl of {} is longer than one hour",
                    ttl
                )));
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn check_absolute(path: &str) -> Result<(), String> {
    let p = Path::new(path);
    if !p.is_absolute() {
        return Err("path must be absolute".to_string());
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("path must not contain '..'".to_string());
    }
    Ok(())
}
