//! CLI for github-sync
//!
//! Run `github-sync --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use github_sync::config::{DEFAULT_BASE_URL, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};
use github_sync::{sync, Label, Milestone, SyncConfig, SyncError, SyncReport};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXAMPLES: &str = "\
Examples:
  github-sync labels -s org/repo -t org2 -l \"area/.*\" stale --token github_token
  github-sync milestones -s org/repo -t org/repo --target-base-url \"https://github.example.com/api/v3\" --target-token github_enterprise_token -l 1.18 1.19 1.20
  github-sync labels -s org/repo -t org2 org3/repo --token github_personal_token
  github-sync milestones -s org/repo -t org --dry-run
  github-sync milestones -s org/repo -t org --update-only";

#[derive(Parser)]
#[command(name = "github-sync")]
#[command(about = "Sync labels and milestones from one repository to others")]
#[command(version, after_help = EXAMPLES)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text, json
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync labels
    Labels(SyncArgs),

    /// Sync milestones
    Milestones(SyncArgs),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Source repository (owner/repo)
    #[arg(short, long)]
    source: String,

    /// Base URL of the GitHub API for the source repository
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    source_base_url: String,

    /// Base URL of the GitHub API for the target repositories
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    target_base_url: String,

    /// Target repositories (owner/repo) or organizations
    #[arg(short, long, required = true, num_args = 1..)]
    target: Vec<String>,

    /// GitHub token; use --source-token or --target-token to set different tokens
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Token for reading the source repository; falls back to --token, then anonymous access
    #[arg(long, env = "GITHUB_SOURCE_TOKEN", hide_env_values = true)]
    source_token: Option<String>,

    /// Token for writing to the target repositories; falls back to --token
    #[arg(long, env = "GITHUB_TARGET_TOKEN", hide_env_values = true)]
    target_token: Option<String>,

    /// Labels or milestones to sync, as regular expressions (default: all)
    #[arg(short, long, num_args = 1..)]
    list: Option<Vec<String>>,

    /// Log changes, do not write
    #[arg(long)]
    dry_run: bool,

    /// Do not create labels or milestones, only update existing ones
    #[arg(long)]
    update_only: bool,

    /// Number of target repositories processed at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

impl SyncArgs {
    fn into_config(self) -> Result<SyncConfig> {
        let mut config =
            SyncConfig::new(&self.source, self.target.as_slice()).context("Invalid configuration")?;
        config.source_base_url = self.source_base_url;
        config.target_base_url = self.target_base_url;
        config.list = self.list;
        config.dry_run = self.dry_run;
        config.update_only = self.update_only;
        config.token = self.token;
        config.source_token = self.source_token;
        config.target_token = self.target_token;
        config.concurrency = self.concurrency;
        config.timeout = Duration::from_secs(self.timeout);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    tokio::select! {
        result = run(cli.command) => match result {
            Ok(report) => {
                for line in report.summary_lines() {
                    println!("{line}");
                }
                if report.has_failures() {
                    Ok(ExitCode::FAILURE)
                } else {
                    Ok(ExitCode::SUCCESS)
                }
            }
            Err(e) if is_configuration_error(&e) => {
                error!("{e:#}");
                eprintln!("Nothing was synced. See `github-sync --help` for usage.");
                Ok(ExitCode::FAILURE)
            }
            Err(e) => Err(e),
        },
        () = wait_for_interrupt(tokio::signal::ctrl_c()) => {
            warn!("Interrupted; create/update calls in flight have an unknown outcome");
            Ok(ExitCode::from(130))
        }
    }
}

/// Whether the run was rejected before any request was made.
fn is_configuration_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<SyncError>()
        .is_some_and(SyncError::is_configuration)
}

/// Resolves once the interrupt signal arrives. If the handler cannot be
/// installed this never resolves and the run continues uninterruptible.
async fn wait_for_interrupt<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer().with_target(false)), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

async fn run(command: Commands) -> Result<SyncReport> {
    match command {
        Commands::Labels(args) => {
            let config = args.into_config()?;
            sync::run::<Label>(&config)
                .await
                .context("Label sync failed")
        }
        Commands::Milestones(args) => {
            let config = args.into_config()?;
            sync::run::<Milestone>(&config)
                .await
                .context("Milestone sync failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_configuration_errors_detected_through_context() {
        let err = Err::<(), _>(SyncError::InvalidTarget("a b".to_string()))
            .context("Invalid configuration")
            .unwrap_err();
        assert!(is_configuration_error(&err));

        let err = Err::<(), _>(SyncError::NotFound("org/src".to_string()))
            .context("Label sync failed")
            .unwrap_err();
        assert!(!is_configuration_error(&err));
    }

    #[tokio::test]
    async fn test_interrupt_resolves_on_signal() {
        tokio::time::timeout(
            Duration::from_secs(1),
            wait_for_interrupt(async { Ok(()) }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_signal_handler_never_interrupts() {
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            wait_for_interrupt(async { Err(io::Error::other("no signal driver")) }),
        )
        .await;
        assert!(waited.is_err());
    }
}
