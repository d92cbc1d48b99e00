//! Run configuration.
//!
//! A [`SyncConfig`] is built once from the command line and handed to the
//! client, the target resolver and the reconciler. Nothing reads options from
//! global state.

use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::targets::{RepositoryCoordinate, TargetSpec};

/// Public GitHub API root, used when no base URL is given.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Default number of target repositories reconciled at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Options for one sync invocation.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Repository whose labels/milestones are the desired state
    pub source: RepositoryCoordinate,
    pub source_base_url: String,
    pub target_base_url: String,
    /// Target specifications in the order given
    pub targets: Vec<TargetSpec>,
    /// Filter patterns; `None` syncs everything
    pub list: Option<Vec<String>>,
    /// Report decisions without creating or updating anything
    pub dry_run: bool,
    /// Never create, only update existing matches
    pub update_only: bool,
    pub token: Option<String>,
    pub source_token: Option<String>,
    pub target_token: Option<String>,
    /// Maximum number of target repositories processed concurrently
    pub concurrency: usize,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl SyncConfig {
    /// Build a configuration from raw `owner/repo` and target strings.
    ///
    /// Every other option starts at its default and can be set on the
    /// returned value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the source or any target is malformed.
    pub fn new<S: AsRef<str>>(source: &str, targets: &[S]) -> Result<Self> {
        let source = source.parse::<RepositoryCoordinate>()?;
        let targets = targets
            .iter()
            .map(|t| t.as_ref().parse::<TargetSpec>())
            .collect::<Result<Vec<_>>>()?;

        if targets.is_empty() {
            return Err(SyncError::Config(
                "at least one target is required".to_string(),
            ));
        }

        Ok(Self {
            source,
            source_base_url: DEFAULT_BASE_URL.to_string(),
            target_base_url: DEFAULT_BASE_URL.to_string(),
            targets,
            list: None,
            dry_run: false,
            update_only: false,
            token: None,
            source_token: None,
            target_token: None,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Token for reading the source: `source_token`, then `token`, else anonymous.
    #[must_use]
    pub fn source_auth(&self) -> Option<&str> {
        self.source_token.as_deref().or(self.token.as_deref())
    }

    /// Token for the targets: `target_token`, then `token`, else anonymous.
    #[must_use]
    pub fn target_auth(&self) -> Option<&str> {
        self.target_token.as_deref().or(self.token.as_deref())
    }

    /// Check option combinations that cannot be expressed by the parser.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` for a zero concurrency, zero timeout, or a
    /// base URL that is not HTTP(S).
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SyncError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SyncError::Config("timeout must be non-zero".to_string()));
        }
        for url in [&self.source_base_url, &self.target_base_url] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(SyncError::Config(format!(
                    "base url '{url}' must start with http:// or https://"
                )));
            }
        }
        Ok(())
    }
}
