/// Errors raised by the keyword graph, the resolver, and the mutation hooks.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeywordFsError {
    /// No directory matches the virtual path, or the child is neither real nor virtual.
    #[error("No such entry: {0}")]
    NotFound(String),

    /// The target of a create already exists, really or virtually.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A file operation was aimed at a directory.
    #[error("Is a directory: {0}")]
    IsDirectory(String),

    /// Structural change that is never allowed (e.g. removing the root).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A real path that is not strictly below the reference root.
    #[error("Path '{path}' is not below reference root '{root}'")]
    OutsideRoot { path: String, root: String },

    /// Failure from the underlying storage, passed through untouched.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl KeywordFsError {
    /// Returns true if the error means "nothing there", whichever layer said so.
    pub fn is_not_found(&self) -> bool {
        match self {
            KeywordFsError::NotFound(_) => true,
            KeywordFsError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<kwfs_config::ConfigError> for KeywordFsError {
    fn from(e: kwfs_config::ConfigError) -> Self {
        KeywordFsError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_from_either_layer() {
        assert!(KeywordFsError::NotFound("/x".to_string()).is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(KeywordFsError::Io(io).is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!KeywordFsError::Io(io).is_not_found());
        assert!(!KeywordFsError::AlreadyExists("/x".to_string()).is_not_found());
    }

    #[test]
    fn test_from_config_error() {
        let err: KeywordFsError = kwfs_config::ConfigError::MissingReferenceRoot.into();
        assert!(matches!(err, KeywordFsError::Config(msg) if msg.contains("reference root")));
    }

    #[test]
    fn test_display_outside_root() {
        let err = KeywordFsError::OutsideRoot {
            path: "/etc".to_string(),
            root: "/data".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc"));
        assert!(msg.contains("/data"));
    }
}
