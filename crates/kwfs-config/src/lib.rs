mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("No reference root configured. Pass one on the command line or set 'reference_root'")]
    MissingReferenceRoot,

    #[error("Invalid path '{0}': {1}")]
    InvalidPath(String, String),

    #[error("Invalid link marker '{0}': {1}")]
    InvalidLinkMarker(String, String),

    #[error("Mount point '{0}' lies inside reference root '{1}'")]
    MountInsideReference(String, String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl KeywordFsConfig {
    /// Parse a configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: KeywordFsConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Render the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The escape link name, falling back to the default.
    pub fn link_marker(&self) -> &str {
        self.link_marker.as_deref().unwrap_or(DEFAULT_LINK_MARKER)
    }

    /// The reference root, or an error if none was configured.
    pub fn reference_root(&self) -> Result<&Path, ConfigError> {
        self.reference_root
            .as_deref()
            .map(Path::new)
            .ok_or(ConfigError::MissingReferenceRoot)
    }
}
