//! Per-repository outcomes and the aggregated run report.
//!
//! Failures are data at this layer: recording a failed outcome never raises,
//! and one bad repository never stops intake of the rest.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::types::RepoKey;

/// Why a repository was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Local history already matches the remote default branch.
    UpToDate,
    /// The working tree or index has uncommitted changes; never touched.
    LocalModifications,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpToDate => write!(f, "up to date"),
            SkipReason::LocalModifications => write!(f, "local modifications present"),
        }
    }
}

/// Why a repository failed to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The git process exceeded the per-operation timeout and was killed.
    Timeout,
    /// Local and remote history have diverged; never reconciled automatically.
    Diverged,
    /// Git metadata is missing or unreadable; never auto-deleted.
    CorruptRepository,
    /// The run was cancelled before this repository finished.
    Cancelled,
    /// Another sync already holds this repository path.
    PathBusy,
    /// The git process exited non-zero.
    Process {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Preparation failed before any git process ran (lock IO, bad inputs).
    Setup { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Diverged => write!(f, "diverged"),
            FailureReason::CorruptRepository => write!(f, "corrupt local repository"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::PathBusy => write!(f, "repository path busy"),
            FailureReason::Process { exit_code, stderr } => {
                match exit_code {
                    Some(code) => write!(f, "process failure (exit code {})", code)?,
                    None => write!(f, "process failure (killed by signal)")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            FailureReason::Setup { message } => write!(f, "{}", message),
        }
    }
}

/// Terminal action taken for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    Cloned,
    Updated,
    Skipped { reason: SkipReason },
    Failed { reason: FailureReason },
}

impl SyncAction {
    /// Short label for summary counting and progress lines.
    pub fn label(&self) -> &'static str {
        match self {
            SyncAction::Cloned => "cloned",
            SyncAction::Updated => "updated",
            SyncAction::Skipped { .. } => "skipped",
            SyncAction::Failed { .. } => "failed",
        }
    }

    /// Human-readable reason, when there is one.
    pub fn reason(&self) -> Option<String> {
        match self {
            SyncAction::Cloned | SyncAction::Updated => None,
            SyncAction::Skipped { reason } => Some(reason.to_string()),
            SyncAction::Failed { reason } => Some(reason.to_string()),
        }
    }
}

/// One terminal outcome per admitted repository.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub repo: RepoKey,
    #[serde(flatten)]
    pub action: SyncAction,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Running counts per action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub cloned: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.cloned + self.updated + self.skipped + self.failed
    }
}

/// Ordered log of outcomes (completion order) plus summary counts.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub counts: Counts,
    pub outcomes: Vec<SyncOutcome>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome as it arrives and bump the matching count.
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome.action {
            SyncAction::Cloned => self.counts.cloned += 1,
            SyncAction::Updated => self.counts.updated += 1,
            SyncAction::Skipped { .. } => self.counts.skipped += 1,
            SyncAction::Failed { .. } => self.counts.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    /// Outcomes whose action is `failed`, in completion order.
    pub fn failures(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.action, SyncAction::Failed { .. }))
    }
}
