//! Per-run outcome tracking and the console summary.

use std::fmt;

use crate::resource::ResourceKind;
use crate::targets::RepositoryCoordinate;

/// What the reconciler decided for one (target, resource) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Update,
    UpToDate,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::UpToDate => write!(f, "up to date"),
        }
    }
}

/// What happened to the call behind a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    /// Nothing to do
    NotNeeded,
    /// Call suppressed by `--dry-run`
    DryRun,
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub key: String,
    pub decision: Decision,
    pub status: CallStatus,
}

/// Result of reconciling one target repository.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub repository: RepositoryCoordinate,
    pub outcomes: Vec<Outcome>,
    /// Set when the target could not be processed at all
    pub error: Option<String>,
}

impl TargetReport {
    #[must_use]
    pub fn new(repository: RepositoryCoordinate) -> Self {
        Self {
            repository,
            outcomes: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(repository: RepositoryCoordinate, error: impl fmt::Display) -> Self {
        Self {
            repository,
            outcomes: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for outcome in &self.outcomes {
            tally.add(outcome);
        }
        tally
    }

    /// Number of mutating calls actually sent (successful or not).
    #[must_use]
    pub fn calls_issued(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, CallStatus::Applied | CallStatus::Failed(_)))
            .count()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.error.is_some()
            || self
                .outcomes
                .iter()
                .any(|o| matches!(o.status, CallStatus::Failed(_)))
    }
}

/// Decision counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub created: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub failed: usize,
}

impl Tally {
    fn add(&mut self, outcome: &Outcome) {
        match outcome.decision {
            Decision::Create => self.created += 1,
            Decision::Update => self.updated += 1,
            Decision::UpToDate => self.up_to_date += 1,
        }
        if matches!(outcome.status, CallStatus::Failed(_)) {
            self.failed += 1;
        }
    }

    fn merge(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.up_to_date += other.up_to_date;
        self.failed += other.failed;
    }

    /// One-line count summary. Dry runs report planned changes.
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let (create, update) = if dry_run {
            ("to create", "to update")
        } else {
            ("created", "updated")
        };
        format!(
            "{} {create}, {} {update}, {} up to date, {} failed",
            self.created, self.updated, self.up_to_date, self.failed
        )
    }
}

/// Everything a sync run did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub kind: ResourceKind,
    pub dry_run: bool,
    /// Number of source resources after filtering
    pub source_count: usize,
    pub targets: Vec<TargetReport>,
    /// Target specifications that could not be expanded, with the reason
    pub unresolved: Vec<(String, String)>,
}

impl SyncReport {
    #[must_use]
    pub fn totals(&self) -> Tally {
        let mut total = Tally::default();
        for target in &self.targets {
            total.merge(target.tally());
        }
        total
    }

    #[must_use]
    pub fn calls_issued(&self) -> usize {
        self.targets.iter().map(TargetReport::calls_issued).sum()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.unresolved.is_empty() || self.targets.iter().any(TargetReport::has_failures)
    }

    /// Human-readable summary, one line per target plus a total.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.targets.len() + self.unresolved.len() + 1);

        for (target, reason) in &self.unresolved {
            lines.push(format!("{target}: skipped ({reason})"));
        }
        for target in &self.targets {
            match &target.error {
                Some(error) => lines.push(format!("{}: failed ({error})", target.repository)),
                None => lines.push(format!(
                    "{}: {}",
                    target.repository,
                    target.tally().summary(self.dry_run)
                )),
            }
        }

        let mode = if self.dry_run { " (dry run)" } else { "" };
        lines.push(format!(
            "Synced {} {}(s) to {} repositories{mode}: {}",
            self.source_count,
            self.kind,
            self.targets.len(),
            self.totals().summary(self.dry_run)
        ));
        lines
    }
}
