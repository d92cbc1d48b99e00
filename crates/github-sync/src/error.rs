//! Error types for label and milestone synchronization.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while syncing repository metadata.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A `--list` pattern is not a valid regular expression
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A repository argument is not in `owner/repo` form
    #[error("Invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),

    /// A target is neither `owner/repo` nor an organization name
    #[error("Invalid target '{0}', expected owner/repo or an organization name")]
    InvalidTarget(String),

    /// The filtered source set contains the same key twice
    #[error("Source contains duplicate {kind} '{key}'")]
    DuplicateKey { kind: &'static str, key: String },

    /// Any other configuration problem
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The forge rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Repository or organization does not exist (or is not visible)
    #[error("Not found: {0}")]
    NotFound(String),

    /// API quota exhausted
    #[error("Rate limit exceeded, reset in {reset_in:?}")]
    RateLimitExceeded { reset_in: Duration },

    /// Any other non-success API response
    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Target expansion produced no repositories
    #[error("No target repositories resolved")]
    NoTargets,
}

impl SyncError {
    /// Whether a failed read may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error is raised before any network call is made.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. }
                | Self::InvalidRepository(_)
                | Self::InvalidTarget(_)
                | Self::DuplicateKey { .. }
                | Self::Config(_)
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        let err = SyncError::Api {
            status: 502,
            message: "Bad Gateway".to_string(),
        };
        assert!(err.is_transient());

        let err = SyncError::Api {
            status: 422,
            message: "Validation Failed".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!SyncError::NotFound("org/repo".to_string()).is_transient());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(SyncError::InvalidRepository("nope".to_string()).is_configuration());
        assert!(SyncError::DuplicateKey {
            kind: "label",
            key: "bug".to_string()
        }
        .is_configuration());
        assert!(!SyncError::Authentication("bad token".to_string()).is_configuration());
    }
}
