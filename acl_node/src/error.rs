// Error handling for the ACL node
//
// Failures of the node runtime itself; anything the ACL core reports is
// carried through unchanged in `NodeError::Acl`.

use acl::AclError;
use std::io;
use thiserror::Error;

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error type for node operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),

    /// Serialization-related errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Errors reported by the ACL subsystem
    #[error(transparent)]
    Acl(#[from] AclError),
}

impl From<toml::de::Error> for NodeError {
    fn from(err: toml::de::Error) -> Self {
        NodeError::Config(format!("Failed to parse config: {}", err))
    }
}

impl From<toml::ser::Error> for NodeError {
    fn from(err: toml::ser::Error) -> Self {
        NodeError::Serialization(format!("Failed to serialize config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_errors_pass_through() {
        let err: NodeError = AclError::PermissionDenied.into();
        assert_eq!(err.to_string(), "Permission denied");
        assert!(matches!(err, NodeError::Acl(AclError::PermissionDenied)));
    }

    #[test]
    fn test_toml_errors_are_config_errors() {
        let err: NodeError = toml::from_str::<toml::Value>("acl = [").unwrap_err().into();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
