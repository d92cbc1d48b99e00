//! Repository coordinates and target expansion.
//!
//! Targets are given either as `owner/repo` or as a bare organization name.
//! Organizations expand to all of their non-archived repositories.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// One repository on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryCoordinate {
    pub owner: String,
    pub repo: String,
}

impl RepositoryCoordinate {
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepositoryCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepositoryCoordinate {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(owner, repo))
            }
            _ => Err(SyncError::InvalidRepository(s.to_string())),
        }
    }
}

/// A `--target` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Explicit `owner/repo`
    Repository(RepositoryCoordinate),
    /// Every non-archived repository of an organization
    Organization(String),
}

impl FromStr for TargetSpec {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.contains('/') {
            return s
                .parse::<RepositoryCoordinate>()
                .map(Self::Repository)
                .map_err(|_| SyncError::InvalidTarget(s.to_string()));
        }
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(SyncError::InvalidTarget(s.to_string()));
        }
        Ok(Self::Organization(s.to_string()))
    }
}

/// Repository entry of an organization listing.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgRepository {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    pub owner: RepositoryOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

/// Lists the repositories owned by an organization.
#[async_trait]
pub trait OrganizationClient: Send + Sync {
    /// Full (all pages) repository listing in forge order.
    async fn list_org_repositories(&self, org: &str) -> Result<Vec<OrgRepository>>;
}

/// A target that could not be expanded.
#[derive(Debug)]
pub struct TargetFailure {
    pub target: String,
    pub error: SyncError,
}

/// Outcome of target expansion.
#[derive(Debug, Default)]
pub struct ResolvedTargets {
    pub repositories: Vec<RepositoryCoordinate>,
    pub failures: Vec<TargetFailure>,
}

/// Expands target specifications into repository coordinates.
pub struct TargetResolver<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: OrganizationClient + ?Sized> TargetResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Resolve targets in input order.
    ///
    /// An organization that cannot be listed, or has no active repositories,
    /// is recorded as a failure and skipped.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoTargets` when nothing resolves.
    pub async fn resolve(&self, specs: &[TargetSpec]) -> Result<ResolvedTargets> {
        let mut resolved = ResolvedTargets::default();

        for spec in specs {
            match spec {
                TargetSpec::Repository(coordinate) => {
                    resolved.repositories.push(coordinate.clone());
                }
                TargetSpec::Organization(org) => match self.expand(org).await {
                    Ok(repos) => resolved.repositories.extend(repos),
                    Err(error) => {
                        warn!(org = %org, error = %error, "Skipping target organization");
                        resolved.failures.push(TargetFailure {
                            target: org.clone(),
                            error,
                        });
                    }
                },
            }
        }

        if resolved.repositories.is_empty() {
            return Err(SyncError::NoTargets);
        }

        info!(
            count = resolved.repositories.len(),
            "Target repositories: {}",
            resolved
                .repositories
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(resolved)
    }

    async fn expand(&self, org: &str) -> Result<Vec<RepositoryCoordinate>> {
        let listing = self.client.list_org_repositories(org).await?;
        let total = listing.len();

        let repos: Vec<_> = listing
            .into_iter()
            .filter(|r| !r.archived)
            .map(|r| RepositoryCoordinate::new(r.owner.login, r.name))
            .collect();

        debug!(
            org,
            total,
            active = repos.len(),
            "Expanded organization targets"
        );

        if repos.is_empty() {
            return Err(SyncError::NotFound(format!(
                "organization '{org}' has no active repositories"
            )));
        }
        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeOrgs(HashMap<String, Vec<OrgRepository>>);

    impl FakeOrgs {
        fn new() -> Self {
            Self(HashMap::new())
        }

        fn with(mut self, org: &str, repos: &[(&str, bool)]) -> Self {
            let listing = repos
                .iter()
                .map(|(name, archived)| OrgRepository {
                    name: (*name).to_string(),
                    archived: *archived,
                    owner: RepositoryOwner {
                        login: org.to_string(),
                    },
                })
                .collect();
            self.0.insert(org.to_string(), listing);
            self
        }
    }

    #[async_trait]
    impl OrganizationClient for FakeOrgs {
        async fn list_org_repositories(&self, org: &str) -> Result<Vec<OrgRepository>> {
            self.0
                .get(org)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(format!("orgs/{org}")))
        }
    }

    fn specs(raw: &[&str]) -> Vec<TargetSpec> {
        raw.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_coordinate() {
        let c: RepositoryCoordinate = "octo-org/hello-world".parse().unwrap();
        assert_eq!(c.owner, "octo-org");
        assert_eq!(c.repo, "hello-world");
        assert_eq!(c.to_string(), "octo-org/hello-world");

        for bad in ["", "/", "org/", "/repo", "a/b/c", "noslash"] {
            assert!(bad.parse::<RepositoryCoordinate>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_parse_target_spec() {
        assert_eq!(
            "org3/repo".parse::<TargetSpec>().unwrap(),
            TargetSpec::Repository(RepositoryCoordinate::new("org3", "repo"))
        );
        assert_eq!(
            "org2".parse::<TargetSpec>().unwrap(),
            TargetSpec::Organization("org2".to_string())
        );
        assert!("".parse::<TargetSpec>().is_err());
        assert!("/repo".parse::<TargetSpec>().is_err());
        assert!("my org".parse::<TargetSpec>().is_err());
    }

    #[tokio::test]
    async fn test_expands_org_and_skips_archived() {
        let client = FakeOrgs::new().with("org2", &[("a", false), ("b", false), ("c", true)]);
        let resolver = TargetResolver::new(&client);

        let resolved = resolver
            .resolve(&specs(&["org2", "org3/repo"]))
            .await
            .unwrap();

        let names: Vec<String> = resolved
            .repositories
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["org2/a", "org2/b", "org3/repo"]);
        assert!(resolved.failures.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_targets_keep_order() {
        let client = FakeOrgs::new();
        let resolver = TargetResolver::new(&client);

        let resolved = resolver.resolve(&specs(&["b/two", "a/one"])).await.unwrap();
        assert_eq!(
            resolved.repositories,
            vec![
                RepositoryCoordinate::new("b", "two"),
                RepositoryCoordinate::new("a", "one")
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_org_is_skipped() {
        let client = FakeOrgs::new().with("empty", &[("old", true)]);
        let resolver = TargetResolver::new(&client);

        let resolved = resolver
            .resolve(&specs(&["missing", "empty", "org3/repo"]))
            .await
            .unwrap();

        assert_eq!(
            resolved.repositories,
            vec![RepositoryCoordinate::new("org3", "repo")]
        );
        assert_eq!(resolved.failures.len(), 2);
        assert_eq!(resolved.failures[0].target, "missing");
        assert!(matches!(
            resolved.failures[1].error,
            SyncError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_nothing_resolved_is_an_error() {
        let client = FakeOrgs::new();
        let resolver = TargetResolver::new(&client);

        let err = resolver.resolve(&specs(&["missing"])).await.unwrap_err();
        assert!(matches!(err, SyncError::NoTargets));
    }
}
