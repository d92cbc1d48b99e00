//! One sync run: read the source, filter, resolve targets, reconcile.

use tracing::info;

use crate::client::{GitHubClient, ResourceClient};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::filter::PatternFilter;
use crate::reconciler::{ensure_unique_keys, ReconcileOptions, Reconciler};
use crate::report::SyncReport;
use crate::resource::Resource;
use crate::targets::{OrganizationClient, RepositoryCoordinate, TargetResolver};

/// Sync resource kind `R` according to `config` against the GitHub API.
///
/// Configuration problems (bad patterns, bad URLs) are reported before any
/// request is sent.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the source cannot be
/// read, the source contains duplicate keys, or no target resolves.
/// Per-target and per-resource failures are recorded in the report instead.
pub async fn run<R: Resource>(config: &SyncConfig) -> Result<SyncReport> {
    config.validate()?;
    let filter = PatternFilter::new(config.list.as_deref())?;

    let source_client =
        GitHubClient::new(&config.source_base_url, config.source_auth(), config.timeout)?;
    let target_client =
        GitHubClient::new(&config.target_base_url, config.target_auth(), config.timeout)?;

    run_with::<R, _, _>(config, &filter, &source_client, &target_client).await
}

/// Same as [`run`] with caller-provided clients.
///
/// # Errors
///
/// See [`run`].
pub async fn run_with<R, S, T>(
    config: &SyncConfig,
    filter: &PatternFilter,
    source_client: &S,
    target_client: &T,
) -> Result<SyncReport>
where
    R: Resource,
    S: ResourceClient<R> + ?Sized,
    T: ResourceClient<R> + OrganizationClient + ?Sized,
{
    let source = read_source::<R, S>(source_client, &config.source, filter).await?;

    let resolved = TargetResolver::new(target_client)
        .resolve(&config.targets)
        .await?;

    let reconciler = Reconciler::new(target_client, ReconcileOptions::from(config));
    let targets = reconciler.sync_all(&source, &resolved.repositories).await;

    Ok(SyncReport {
        kind: R::KIND,
        dry_run: config.dry_run,
        source_count: source.len(),
        targets,
        unresolved: resolved
            .failures
            .into_iter()
            .map(|f| (f.target, f.error.to_string()))
            .collect(),
    })
}

/// List the source, apply the filter and reject duplicate keys.
///
/// # Errors
///
/// Any failure to read the source is returned as is; there is nothing to
/// sync without it.
pub async fn read_source<R, C>(
    client: &C,
    source: &RepositoryCoordinate,
    filter: &PatternFilter,
) -> Result<Vec<R>>
where
    R: Resource,
    C: ResourceClient<R> + ?Sized,
{
    let all = client.list(source).await?;
    let total = all.len();
    let selected = filter.apply(all, R::key);
    ensure_unique_keys(&selected)?;

    info!(
        source = %source,
        total,
        selected = selected.len(),
        "Source {}s: {}",
        R::KIND,
        selected
            .iter()
            .map(R::key)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(selected)
}
