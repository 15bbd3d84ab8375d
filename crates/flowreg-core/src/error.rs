//! Error types for flowreg.

use thiserror::Error;

/// Result type alias using flowreg's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for flowreg operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Entity id is unknown to the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Claimed revision no longer matches the stored revision
    #[error(
        "Stale revision for {entity_id}: claimed version {claimed} but current version is {current}"
    )]
    StaleRevision {
        entity_id: String,
        claimed: u64,
        current: u64,
    },

    /// Create attempted on a live id or name
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Payload stamped with a data model version no serializer is registered for
    #[error("Unsupported data model version {version} (supported: {supported:?})")]
    UnsupportedDataModelVersion { version: u32, supported: Vec<u32> },

    /// Malformed bytes or unencodable object
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O failure from a persistence or metadata collaborator
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Revision supplied by the caller is not acceptable for the operation
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code an upstream handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::StaleRevision { .. } => 409,
            Error::AlreadyExists(_) => 409,
            Error::UnsupportedDataModelVersion { .. } => 500,
            Error::Serialization(_) => 400,
            Error::Persistence(_) => 500,
            Error::InvalidRevision(_) => 400,
            Error::InvalidInput(_) => 400,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether re-reading the current revision and retrying can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StaleRevision { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("bucket b1".to_string());
        assert_eq!(err.to_string(), "Not found: bucket b1");
    }

    #[test]
    fn test_error_display_stale_revision() {
        let err = Error::StaleRevision {
            entity_id: "flow1".to_string(),
            claimed: 0,
            current: 1,
        };
        assert_eq!(
            err.to_string(),
            "Stale revision for flow1: claimed version 0 but current version is 1"
        );
    }

    #[test]
    fn test_error_display_unsupported_version_names_version() {
        let err = Error::UnsupportedDataModelVersion {
            version: 7,
            supported: vec![1, 2],
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("[1, 2]"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(
            Error::StaleRevision {
                entity_id: "x".into(),
                claimed: 1,
                current: 2
            }
            .status_code(),
            409
        );
        assert_eq!(Error::AlreadyExists("x".into()).status_code(), 409);
        assert_eq!(Error::Persistence("disk".into()).status_code(), 500);
        assert_eq!(Error::InvalidRevision("x".into()).status_code(), 400);
    }

    #[test]
    fn test_only_stale_revision_is_retryable() {
        assert!(Error::StaleRevision {
            entity_id: "x".into(),
            claimed: 0,
            current: 3
        }
        .is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::Persistence("x".into()).is_retryable());
        assert!(!Error::UnsupportedDataModelVersion {
            version: 9,
            supported: vec![1]
        }
        .is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Persistence(msg) => assert!(msg.contains("access denied")),
            _ => panic!("Expected Persistence error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
