//! Error types for boardsync-core

use thiserror::Error;

/// Result type alias using boardsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in boardsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Board not found
    #[error("Board not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth token missing, not yet propagated, or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Remote store refused the request (payload too large, quota, validation)
    #[error("Remote rejected request: {0}")]
    Rejected(String),

    /// A board operation was attempted before a workspace was selected
    #[error("No workspace selected")]
    NoWorkspace,

    /// Key derivation, encryption, decryption or checksum failure
    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Coarse classification used to decide between retrying, queueing and surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity trouble; retried with queue backoff
    TransientNetwork,
    /// Token not valid yet; retried a bounded number of times
    AuthNotReady,
    /// The remote will never accept this request as-is
    PermanentRejection,
    /// Caller misuse, never queued
    ProgrammerError,
    /// On-device failure (storage, serialization, crypto)
    Local,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::Http(error) => {
                if error.status().is_some_and(|status| status.is_client_error()) {
                    ErrorKind::PermanentRejection
                } else {
                    ErrorKind::TransientNetwork
                }
            }
            Self::Unauthorized(_) => ErrorKind::AuthNotReady,
            Self::Rejected(_) | Self::NotFound(_) => ErrorKind::PermanentRejection,
            Self::NoWorkspace | Self::InvalidInput(_) => ErrorKind::ProgrammerError,
            Self::Database(_)
            | Self::Sqlite(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Encryption(_) => ErrorKind::Local,
        }
    }

    /// Whether replaying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::AuthNotReady
        )
    }

    /// Whether the facade should return this error instead of degrading to the offline path.
    pub fn must_surface(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PermanentRejection | ErrorKind::ProgrammerError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_taxonomy() {
        assert_eq!(
            Error::Network("offline".into()).kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            Error::Unauthorized("token".into()).kind(),
            ErrorKind::AuthNotReady
        );
        assert_eq!(
            Error::Rejected("payload too large".into()).kind(),
            ErrorKind::PermanentRejection
        );
        assert_eq!(Error::NoWorkspace.kind(), ErrorKind::ProgrammerError);
    }

    #[test]
    fn only_network_and_auth_errors_are_retryable() {
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::Unauthorized("expired".into()).is_retryable());
        assert!(!Error::NotFound("brd_1".into()).is_retryable());
        assert!(!Error::NoWorkspace.is_retryable());
        assert!(!Error::Encryption("bad tag".into()).is_retryable());
    }

    #[test]
    fn surfaces_permanent_and_programmer_errors() {
        assert!(Error::Rejected("quota".into()).must_surface());
        assert!(Error::NoWorkspace.must_surface());
        assert!(!Error::Network("timeout".into()).must_surface());
        assert!(!Error::Database("disk full".into()).must_surface());
    }
}
