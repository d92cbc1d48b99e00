//! # Reconciler
//!
//! Brings each target repository's labels or milestones in line with the
//! source set. For every source resource the target is searched by key:
//!
//! - found and equivalent: up to date, no call
//! - found and different: update the mutable fields, addressed by the
//!   target's own identifier
//! - not found: create (unless update-only)
//!
//! Resources present only in a target are left alone. Every decision is
//! logged before the corresponding call is made, so a dry run prints the same
//! decisions as a real run.

use std::collections::HashSet;
use std::marker::PhantomData;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::client::ResourceClient;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::report::{CallStatus, Decision, Outcome, TargetReport};
use crate::resource::Resource;
use crate::targets::RepositoryCoordinate;

/// One planned step for a (target, source resource) pair.
#[derive(Debug, Clone)]
pub enum SyncAction<R: Resource> {
    /// Key missing from the target
    Create(R),
    /// Key present with different mutable fields
    Update {
        /// Identifier of the existing target resource
        id: R::Id,
        /// Desired state
        resource: R,
        /// `old->new` description of the mutable fields
        changes: String,
    },
    UpToDate(R),
}

impl<R: Resource> SyncAction<R> {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Create(r) | Self::UpToDate(r) | Self::Update { resource: r, .. } => r.key(),
        }
    }

    #[must_use]
    pub fn decision(&self) -> Decision {
        match self {
            Self::Create(_) => Decision::Create,
            Self::Update { .. } => Decision::Update,
            Self::UpToDate(_) => Decision::UpToDate,
        }
    }

    /// Log line describing the decision for `repo`.
    #[must_use]
    pub fn describe(&self, repo: &RepositoryCoordinate) -> String {
        let kind = R::KIND;
        match self {
            Self::Create(r) => format!("Create {kind} {repo} {}", r.key()),
            Self::Update {
                resource, changes, ..
            } => format!("Update {kind} {repo} {}: {changes}", resource.key()),
            Self::UpToDate(r) => format!("Already up to date: {kind} {repo} {}", r.key()),
        }
    }
}

/// Compute the actions for one target.
///
/// `existing` is the complete current list of the target. The first existing
/// resource with an exactly equal key is the match. With `update_only`, source
/// resources missing from the target produce no action.
#[must_use]
pub fn plan<R: Resource>(source: &[R], existing: &[R], update_only: bool) -> Vec<SyncAction<R>> {
    source
        .iter()
        .filter_map(|desired| {
            match existing.iter().find(|current| current.key() == desired.key()) {
                Some(current) if desired.is_equivalent(current) => {
                    Some(SyncAction::UpToDate(desired.clone()))
                }
                Some(current) => Some(SyncAction::Update {
                    id: current.id(),
                    resource: desired.clone(),
                    changes: desired.describe_changes(current),
                }),
                None if update_only => {
                    debug!(
                        kind = %R::KIND,
                        key = desired.key(),
                        "Missing in target, not created (update-only)"
                    );
                    None
                }
                None => Some(SyncAction::Create(desired.clone())),
            }
        })
        .collect()
}

/// Reject a source set that contains the same key twice.
///
/// # Errors
///
/// Returns `SyncError::DuplicateKey` naming the first repeated key.
pub fn ensure_unique_keys<R: Resource>(source: &[R]) -> Result<()> {
    let mut seen = HashSet::with_capacity(source.len());
    for resource in source {
        if !seen.insert(resource.key()) {
            return Err(SyncError::DuplicateKey {
                kind: R::KIND.as_str(),
                key: resource.key().to_string(),
            });
        }
    }
    Ok(())
}

/// Modes that change what the reconciler does with its plan.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    pub update_only: bool,
    /// Maximum number of targets processed at once
    pub concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            update_only: false,
            concurrency: 1,
        }
    }
}

impl From<&SyncConfig> for ReconcileOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            update_only: config.update_only,
            concurrency: config.concurrency.max(1),
        }
    }
}

/// Applies plans for one resource kind through a [`ResourceClient`].
pub struct Reconciler<'a, R, C: ?Sized> {
    client: &'a C,
    options: ReconcileOptions,
    _kind: PhantomData<fn() -> R>,
}

impl<'a, R, C> Reconciler<'a, R, C>
where
    R: Resource,
    C: ResourceClient<R> + ?Sized,
{
    pub fn new(client: &'a C, options: ReconcileOptions) -> Self {
        Self {
            client,
            options,
            _kind: PhantomData,
        }
    }

    /// Reconcile every target. Reports come back in target order.
    ///
    /// With a concurrency above one, log lines of different targets may
    /// interleave; the returned reports are still ordered.
    pub async fn sync_all(
        &self,
        source: &[R],
        targets: &[RepositoryCoordinate],
    ) -> Vec<TargetReport> {
        stream::iter(targets)
            .map(|repo| self.sync_target(source, repo))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    /// Reconcile a single target repository.
    ///
    /// A failure to list the target aborts this target only. Failed create or
    /// update calls are recorded and the remaining resources still processed.
    pub async fn sync_target(&self, source: &[R], repo: &RepositoryCoordinate) -> TargetReport {
        let existing = match self.client.list(repo).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(repository = %repo, error = %e, "Failed to list target {}s", R::KIND);
                return TargetReport::failed(repo.clone(), e);
            }
        };
        debug!(repository = %repo, count = existing.len(), "Fetched target {}s", R::KIND);

        let mut report = TargetReport::new(repo.clone());
        for action in plan(source, &existing, self.options.update_only) {
            let status = self.apply(repo, &action).await;
            report.outcomes.push(Outcome {
                key: action.key().to_string(),
                decision: action.decision(),
                status,
            });
        }
        report
    }

    async fn apply(&self, repo: &RepositoryCoordinate, action: &SyncAction<R>) -> CallStatus {
        let line = action.describe(repo);

        if let SyncAction::UpToDate(_) = action {
            info!("{line}");
            return CallStatus::NotNeeded;
        }
        if self.options.dry_run {
            info!("[dry-run] {line}");
            return CallStatus::DryRun;
        }
        info!("{line}");

        let result = match action {
            SyncAction::Create(resource) => self.client.create(repo, resource).await,
            SyncAction::Update { id, resource, .. } => {
                self.client.update(repo, id, resource).await
            }
            SyncAction::UpToDate(_) => Ok(()),
        };

        match result {
            Ok(()) => CallStatus::Applied,
            Err(e) => {
                warn!(
                    repository = %repo,
                    key = action.key(),
                    error = %e,
                    "Failed to {} {}",
                    action.decision(),
                    R::KIND
                );
                CallStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Label, Milestone, MilestoneState};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create(String, String),
        Update(String, String),
    }

    /// In-memory forge holding one resource list per repository.
    struct FakeForge<R> {
        repos: Mutex<HashMap<String, Vec<R>>>,
        calls: Mutex<Vec<Call>>,
        failing_repos: HashSet<String>,
    }

    impl<R: Resource> FakeForge<R> {
        fn new() -> Self {
            Self {
                repos: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                failing_repos: HashSet::new(),
            }
        }

        fn with_repo(self, repo: &str, resources: Vec<R>) -> Self {
            self.repos
                .lock()
                .unwrap()
                .insert(repo.to_string(), resources);
            self
        }

        fn failing_writes(mut self, repo: &str) -> Self {
            self.failing_repos.insert(repo.to_string());
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn take_calls(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn check_writable(&self, repo: &RepositoryCoordinate) -> Result<()> {
            if self.failing_repos.contains(&repo.to_string()) {
                return Err(SyncError::Authentication("Bad credentials".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<R: Resource> ResourceClient<R> for FakeForge<R> {
        async fn list(&self, repo: &RepositoryCoordinate) -> Result<Vec<R>> {
            self.repos
                .lock()
                .unwrap()
                .get(&repo.to_string())
                .cloned()
                .ok_or_else(|| SyncError::NotFound(repo.to_string()))
        }

        async fn create(&self, repo: &RepositoryCoordinate, resource: &R) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(repo.to_string(), resource.key().to_string()));
            self.check_writable(repo)?;
            self.repos
                .lock()
                .unwrap()
                .entry(repo.to_string())
                .or_default()
                .push(resource.clone());
            Ok(())
        }

        async fn update(&self, repo: &RepositoryCoordinate, id: &R::Id, resource: &R) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(repo.to_string(), id.to_string()));
            self.check_writable(repo)?;
            let mut repos = self.repos.lock().unwrap();
            let list = repos.entry(repo.to_string()).or_default();
            if let Some(slot) = list.iter_mut().find(|r| r.id().to_string() == id.to_string()) {
                *slot = resource.clone();
            }
            Ok(())
        }
    }

    fn label(name: &str, color: &str, description: Option<&str>) -> Label {
        Label {
            name: name.to_string(),
            color: color.to_string(),
            description: description.map(ToString::to_string),
        }
    }

    fn milestone(number: u64, title: &str, due_on: Option<&str>) -> Milestone {
        Milestone {
            title: title.to_string(),
            description: None,
            due_on: due_on.map(ToString::to_string),
            number,
            state: MilestoneState::Open,
        }
    }

    fn repo(s: &str) -> RepositoryCoordinate {
        s.parse().unwrap()
    }

    fn source_labels() -> Vec<Label> {
        vec![
            label("bug", "d73a4a", Some("Something isn't working")),
            label("stale", "ffffff", None),
            label("area/ci", "0e8a16", None),
        ]
    }

    #[test]
    fn test_plan_decisions() {
        let existing = vec![
            label("bug", "d73a4a", Some("Something isn't working")),
            label("stale", "ededed", None),
            label("wontfix", "ffffff", None),
        ];

        let actions = plan(&source_labels(), &existing, false);
        let decisions: Vec<_> = actions.iter().map(|a| (a.key(), a.decision())).collect();
        assert_eq!(
            decisions,
            vec![
                ("bug", Decision::UpToDate),
                ("stale", Decision::Update),
                ("area/ci", Decision::Create),
            ]
        );
    }

    #[test]
    fn test_plan_update_only_skips_creates() {
        let existing = vec![label("stale", "ededed", None)];
        let actions = plan(&source_labels(), &existing, true);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].decision(), Decision::Update);
    }

    #[test]
    fn test_plan_key_match_is_case_sensitive() {
        let existing = vec![label("Bug", "d73a4a", Some("Something isn't working"))];
        let actions = plan(&source_labels()[..1], &existing, false);
        assert_eq!(actions[0].decision(), Decision::Create);
    }

    #[test]
    fn test_plan_addresses_milestone_update_by_target_number() {
        let source = vec![milestone(1, "1.18", Some("2024-03-01T00:00:00Z"))];
        let existing = vec![milestone(42, "1.18", None)];

        match &plan(&source, &existing, false)[0] {
            SyncAction::Update { id, resource, .. } => {
                assert_eq!(*id, 42);
                assert_eq!(resource.title, "1.18");
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_describe() {
        let target = repo("org/a");
        let action = SyncAction::Create(label("stale", "ffffff", None));
        assert_eq!(action.describe(&target), "Create label org/a stale");

        let action = SyncAction::UpToDate(label("bug", "d73a4a", None));
        assert_eq!(
            action.describe(&target),
            "Already up to date: label org/a bug"
        );
    }

    #[test]
    fn test_duplicate_source_keys_rejected() {
        let mut source = source_labels();
        source.push(label("stale", "000000", None));
        let err = ensure_unique_keys(&source).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateKey { key, .. } if key == "stale"));
        assert!(ensure_unique_keys(&source_labels()).is_ok());
    }

    #[tokio::test]
    async fn test_up_to_date_issues_no_calls() {
        let forge = FakeForge::new().with_repo("org/a", source_labels());
        let reconciler = Reconciler::new(&forge, ReconcileOptions::default());

        let report = reconciler.sync_target(&source_labels(), &repo("org/a")).await;

        assert!(report
            .outcomes
            .iter()
            .all(|o| o.decision == Decision::UpToDate && o.status == CallStatus::NotNeeded));
        assert!(forge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_update_calls() {
        let forge = FakeForge::new().with_repo(
            "org/a",
            vec![
                label("stale", "ededed", None),
                label("wontfix", "ffffff", None),
            ],
        );
        let reconciler = Reconciler::new(&forge, ReconcileOptions::default());

        let report = reconciler.sync_target(&source_labels(), &repo("org/a")).await;

        assert_eq!(
            forge.calls(),
            vec![
                Call::Create("org/a".to_string(), "bug".to_string()),
                Call::Update("org/a".to_string(), "stale".to_string()),
                Call::Create("org/a".to_string(), "area/ci".to_string()),
            ]
        );
        assert_eq!(report.calls_issued(), 3);
        assert!(!report.has_failures());

        // Nothing is ever deleted
        let remaining = forge.list(&repo("org/a")).await.unwrap();
        assert!(remaining.iter().any(|l: &Label| l.name == "wontfix"));
    }

    #[tokio::test]
    async fn test_update_only_issues_no_create() {
        let forge = FakeForge::<Label>::new().with_repo("org/a", vec![]);
        let options = ReconcileOptions {
            update_only: true,
            ..ReconcileOptions::default()
        };
        let reconciler = Reconciler::new(&forge, options);

        let report = reconciler.sync_target(&source_labels(), &repo("org/a")).await;

        assert!(report.outcomes.is_empty());
        assert!(forge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_decisions() {
        let existing = vec![label("stale", "ededed", None)];

        let dry_forge = FakeForge::new().with_repo("org/a", existing.clone());
        let dry = Reconciler::new(
            &dry_forge,
            ReconcileOptions {
                dry_run: true,
                ..ReconcileOptions::default()
            },
        );
        let dry_report = dry.sync_target(&source_labels(), &repo("org/a")).await;

        let real_forge = FakeForge::new().with_repo("org/a", existing);
        let real = Reconciler::new(&real_forge, ReconcileOptions::default());
        let real_report = real.sync_target(&source_labels(), &repo("org/a")).await;

        let decisions = |r: &TargetReport| {
            r.outcomes
                .iter()
                .map(|o| (o.key.clone(), o.decision))
                .collect::<Vec<_>>()
        };
        assert_eq!(decisions(&dry_report), decisions(&real_report));
        assert!(dry_forge.calls().is_empty());
        assert_eq!(dry_report.calls_issued(), 0);
        assert!(dry_report
            .outcomes
            .iter()
            .filter(|o| o.decision != Decision::UpToDate)
            .all(|o| o.status == CallStatus::DryRun));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let forge = FakeForge::new().with_repo("org/a", vec![label("stale", "ededed", None)]);
        let reconciler = Reconciler::new(&forge, ReconcileOptions::default());

        reconciler.sync_target(&source_labels(), &repo("org/a")).await;
        assert_eq!(forge.take_calls().len(), 3);

        let second = reconciler.sync_target(&source_labels(), &repo("org/a")).await;
        assert!(forge.calls().is_empty());
        assert_eq!(second.tally().up_to_date, 3);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_targets() {
        let forge = FakeForge::<Label>::new()
            .with_repo("org/a", vec![])
            .with_repo("org/b", vec![])
            .failing_writes("org/a");
        let options = ReconcileOptions {
            concurrency: 2,
            ..ReconcileOptions::default()
        };
        let reconciler = Reconciler::new(&forge, options);

        let targets = vec![repo("org/missing"), repo("org/a"), repo("org/b")];
        let reports = reconciler.sync_all(&source_labels(), &targets).await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].repository, repo("org/missing"));
        assert!(reports[0].error.is_some());

        // Every create on org/a was attempted and failed individually
        assert_eq!(reports[1].tally().failed, 3);
        assert_eq!(reports[1].calls_issued(), 3);

        assert!(!reports[2].has_failures());
        assert_eq!(reports[2].tally().created, 3);
    }

    #[tokio::test]
    async fn test_milestones_updated_by_number() {
        let forge = FakeForge::new().with_repo(
            "org/a",
            vec![milestone(7, "1.18", Some("2024-03-01T23:59:59Z")), milestone(8, "1.19", None)],
        );
        let reconciler = Reconciler::new(&forge, ReconcileOptions::default());
        let source = vec![
            milestone(1, "1.18", Some("2024-03-01T00:00:00Z")),
            milestone(2, "1.19", Some("2024-06-01T00:00:00Z")),
        ];

        let report = reconciler.sync_target(&source, &repo("org/a")).await;

        assert_eq!(report.outcomes[0].decision, Decision::UpToDate);
        assert_eq!(
            forge.calls(),
            vec![Call::Update("org/a".to_string(), "8".to_string())]
        );
    }
}
