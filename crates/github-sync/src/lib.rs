//! Sync labels and milestones from one GitHub repository to others.
//!
//! The source repository's labels or milestones are the desired state. Each
//! target repository (given as `owner/repo`, or as an organization name that
//! expands to all of its non-archived repositories) is brought in line by
//! creating missing resources and updating ones whose fields differ.
//! Nothing is ever deleted from a target.
//!
//! # Usage
//!
//! ```no_run
//! use github_sync::{sync, Label, SyncConfig};
//!
//! # async fn example() -> github_sync::Result<()> {
//! let mut config = SyncConfig::new("org/repo", &["org2", "org3/repo"])?;
//! config.list = Some(vec!["area/.*".to_string(), "^stale$".to_string()]);
//! config.dry_run = true;
//!
//! let report = sync::run::<Label>(&config).await?;
//! for line in report.summary_lines() {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`Resource`] describes a resource kind: key, identifier, equality rule
//!   and request payloads. [`Label`] and [`Milestone`] implement it.
//! - [`ResourceClient`] lists, creates and updates one kind;
//!   [`GitHubClient`] implements it over the REST API.
//! - [`PatternFilter`] narrows the source set with `--list` patterns.
//! - [`TargetResolver`] expands organizations into repositories.
//! - [`Reconciler`] plans and applies create/update decisions per target.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod reconciler;
pub mod report;
pub mod resource;
pub mod sync;
pub mod targets;

pub use client::{GitHubClient, ResourceClient};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use filter::PatternFilter;
pub use reconciler::{plan, ReconcileOptions, Reconciler, SyncAction};
pub use report::{CallStatus, Decision, Outcome, SyncReport, TargetReport};
pub use resource::{Label, Milestone, MilestoneState, Resource, ResourceKind};
pub use targets::{OrganizationClient, RepositoryCoordinate, TargetResolver, TargetSpec};
