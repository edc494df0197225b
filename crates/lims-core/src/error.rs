//! Error types for LIMS Core
//!
//! One taxonomy covers every fallible case-tracking operation:
//! - Unknown cases or employees
//! - PIN mismatches
//! - Rejected input (empty case names, bad file names)
//! - Filesystem access refused
//! - Remote mirror unreachable or misconfigured

use std::path::PathBuf;

/// Main LIMS error type
#[derive(Debug, thiserror::Error)]
pub enum LimsError {
    /// Unknown case or employee
    #[error("not found: {0}")]
    NotFound(String),

    /// PIN did not match the employee record
    #[error("invalid credential for employee '{employee_id}'")]
    InvalidCredential {
        /// Employee the PIN was presented for
        employee_id: String,
    },

    /// Missing or malformed caller input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Filesystem refused access
    #[error("permission denied: {}", path.display())]
    PermissionDenied {
        /// Path that could not be accessed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Remote mirror unreachable or not configured
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Any other IO failure
    #[error("io error at {}: {source}", path.display())]
    Io {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// State document could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LimsError {
    /// Wrap an IO error, classifying permission failures
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            _ => Self::Io { path, source },
        }
    }

    /// Create not-found error
    #[inline]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create validation error
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Error classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCredential { .. } => ErrorKind::InvalidCredential,
            Self::Validation(_) => ErrorKind::Validation,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            Self::Io { .. } | Self::Config(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code a caller should see for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidCredential | ErrorKind::PermissionDenied => 403,
            ErrorKind::Validation => 400,
            ErrorKind::RemoteUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Check if the caller caused this error
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::InvalidCredential | ErrorKind::Validation
        )
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown case or employee
    NotFound,
    /// PIN mismatch
    InvalidCredential,
    /// Rejected input
    Validation,
    /// Filesystem access refused
    PermissionDenied,
    /// Mirror unreachable
    RemoteUnavailable,
    /// Everything else
    Internal,
}

/// Result type alias for LIMS operations
pub type LimsResult<T> = Result<T, LimsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn not_found_display() {
        let err = LimsError::not_found("case 'Juan'");
        assert_eq!(err.to_string(), "not found: case 'Juan'");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn io_permission_denied_is_classified() {
        let err = LimsError::io(
            "/cases/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, LimsError::PermissionDenied { .. }));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.to_string().contains("/cases/x"));
    }

    #[test]
    fn other_io_errors_stay_internal() {
        let err = LimsError::io("/cases/x", io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn credential_errors_are_client_errors() {
        let err = LimsError::InvalidCredential {
            employee_id: "carlos".to_string(),
        };
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), 403);
        assert!(!LimsError::RemoteUnavailable("down".into()).is_client_error());
    }
}
