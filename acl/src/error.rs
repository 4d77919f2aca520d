// Error handling for the ACL subsystem
//
// Every failure surfaced by the ACL endpoints maps to exactly one of these
// kinds. None of them is retried by the core.

use std::result;
use thiserror::Error;

/// Result type for ACL operations
pub type Result<T> = result::Result<T, AclError>;

/// Error type for ACL operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AclError {
    /// Unknown policy name, token accessor or token secret
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// The identifier that did not resolve
        id: String,
    },

    /// Explicitly assigned identifier collides with an existing one
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The bootstrap token has already been created
    #[error("ACL bootstrap already done (index: {index})")]
    AlreadyBootstrapped {
        /// Index at which the bootstrap marker was set
        index: u64,
    },

    /// Missing privileges, or an unusable one-time token.
    ///
    /// Deliberately carries no detail: an exchange of a one-time secret that
    /// never existed, expired, or was already consumed all look the same.
    #[error("Permission denied")]
    PermissionDenied,

    /// Request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// ACL support is switched off for this node
    #[error("ACL support disabled")]
    Disabled,

    /// The write pipeline or the consensus log failed
    #[error("Replication error: {0}")]
    Replication(String),
}

impl AclError {
    pub(crate) fn policy_not_found(name: &str) -> Self {
        AclError::NotFound {
            entity: "ACL policy",
            id: name.to_string(),
        }
    }

    pub(crate) fn token_not_found(accessor_id: &str) -> Self {
        AclError::NotFound {
            entity: "ACL token",
            id: accessor_id.to_string(),
        }
    }
}

impl From<bincode::Error> for AclError {
    fn from(err: bincode::Error) -> Self {
        AclError::Replication(format!("failed to encode log entry: {}", err))
    }
}
