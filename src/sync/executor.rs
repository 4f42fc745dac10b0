//! Clone-or-update of a single repository, with path exclusivity.
//!
//! One executor is shared by every worker. Each call owns exactly one
//! repository path for its duration, guarded twice: an in-process claim set
//! catches duplicate descriptors in the same run, and an advisory file lock
//! excludes concurrent invocations of the tool itself.
//!
//! Failures are returned as outcomes, never raised; the only thing that can
//! stop the run is cancellation, and even that surfaces as per-repository
//! `failed: cancelled` outcomes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::paths::SyncPaths;
use crate::report::{FailureReason, SkipReason, SyncAction, SyncOutcome};
use crate::sync::git::{GitCli, GitError};
use crate::sync::lock::RepoLock;
use crate::sync::state::{self, BranchPosition, LocalState};
use crate::types::{RepoDescriptor, RepoKey};

/// How long to wait for another invocation to release a repository's lock.
const LOCK_WAIT: Duration = Duration::from_secs(30);

/// Synchronizes one repository at a time against its local path.
pub struct SyncExecutor {
    git: GitCli,
    paths: SyncPaths,
    claims: DashMap<RepoKey, ()>,
    cancel: Arc<AtomicBool>,
    lock_wait: Duration,
}

/// In-process claim on a repository path; released on drop.
struct PathClaim<'a> {
    claims: &'a DashMap<RepoKey, ()>,
    key: RepoKey,
}

impl Drop for PathClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.key);
    }
}

impl SyncExecutor {
    pub fn new(git: GitCli, paths: SyncPaths, cancel: Arc<AtomicBool>) -> Self {
        Self {
            git,
            paths,
            claims: DashMap::new(),
            cancel,
            lock_wait: LOCK_WAIT,
        }
    }

    #[cfg(test)]
    fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Bring one repository's local path up to date with its remote.
    /// Always returns an outcome; every failure mode is data.
    pub fn sync(&self, desc: &RepoDescriptor) -> SyncOutcome {
        let started = Instant::now();
        let action = self.sync_action(desc);

        match &action {
            SyncAction::Cloned => log::info!("{}: cloned", desc.key),
            SyncAction::Updated => log::info!("{}: updated", desc.key),
            SyncAction::Skipped { reason } => log::debug!("{}: skipped ({})", desc.key, reason),
            SyncAction::Failed { reason } => log::warn!("{}: failed ({})", desc.key, reason),
        }

        SyncOutcome {
            repo: desc.key.clone(),
            action,
            duration: started.elapsed(),
        }
    }

    fn sync_action(&self, desc: &RepoDescriptor) -> SyncAction {
        if self.cancel.load(Ordering::Relaxed) {
            return SyncAction::Failed {
                reason: FailureReason::Cancelled,
            };
        }

        let Some(_claim) = self.claim(&desc.key) else {
            return SyncAction::Failed {
                reason: FailureReason::PathBusy,
            };
        };

        let lock_path = self.paths.lock_path(&desc.key);
        let _lock = match RepoLock::acquire_with_timeout(&lock_path, self.lock_wait) {
            Ok(lock) => lock,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return SyncAction::Failed {
                    reason: FailureReason::PathBusy,
                };
            }
            Err(e) => {
                return SyncAction::Failed {
                    reason: FailureReason::Setup {
                        message: format!("could not lock {}: {}", lock_path.display(), e),
                    },
                };
            }
        };

        let repo_dir = self.paths.repo_dir(&desc.key);
        match state::inspect(&repo_dir) {
            LocalState::Absent => self.clone_into(desc, &repo_dir),
            LocalState::Dirty => SyncAction::Skipped {
                reason: SkipReason::LocalModifications,
            },
            LocalState::Corrupt => SyncAction::Failed {
                reason: FailureReason::CorruptRepository,
            },
            LocalState::Clean => self.update(desc, &repo_dir),
        }
    }

    fn claim(&self, key: &RepoKey) -> Option<PathClaim<'_>> {
        match self.claims.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(PathClaim {
                    claims: &self.claims,
                    key: key.clone(),
                })
            }
        }
    }

    fn clone_into(&self, desc: &RepoDescriptor, repo_dir: &Path) -> SyncAction {
        match self.git.clone_repo(&desc.clone_url, repo_dir, &self.cancel) {
            Ok(()) => SyncAction::Cloned,
            Err(e) => failed(e),
        }
    }

    /// Fetch, compare against the remote default branch, fast-forward only
    /// when strictly behind. A diverged branch is classified before any merge
    /// process is spawned.
    fn update(&self, desc: &RepoDescriptor, repo_dir: &Path) -> SyncAction {
        if let Err(e) = self.git.fetch(repo_dir, &self.cancel) {
            return failed(e);
        }

        let position = match state::branch_position(repo_dir, &desc.default_branch) {
            Ok(position) => position,
            Err(e) => {
                return SyncAction::Failed {
                    reason: FailureReason::Setup {
                        message: format!("could not compare branches: {}", e),
                    },
                };
            }
        };

        match position {
            BranchPosition::UpToDate => SyncAction::Skipped {
                reason: SkipReason::UpToDate,
            },
            BranchPosition::Ahead => {
                log::debug!("{}: local is ahead of origin, nothing to pull", desc.key);
                SyncAction::Skipped {
                    reason: SkipReason::UpToDate,
                }
            }
            BranchPosition::NoUpstream => {
                log::warn!(
                    "{}: no remote-tracking ref for '{}', leaving as-is",
                    desc.key,
                    desc.default_branch
                );
                SyncAction::Skipped {
                    reason: SkipReason::UpToDate,
                }
            }
            BranchPosition::Diverged => SyncAction::Failed {
                reason: FailureReason::Diverged,
            },
            BranchPosition::Behind => {
                match self
                    .git
                    .merge_ff_only(repo_dir, &desc.default_branch, &self.cancel)
                {
                    Ok(()) => SyncAction::Updated,
                    // The pre-merge comparison should have caught this; the
                    // stderr check covers a remote that moved in between.
                    Err(GitError::Process { stderr, .. })
                        if stderr.contains("Not possible to fast-forward") =>
                    {
                        SyncAction::Failed {
                            reason: FailureReason::Diverged,
                        }
                    }
                    Err(e) => failed(e),
                }
            }
        }
    }
}

fn failed(error: GitError) -> SyncAction {
    let reason = match error {
        GitError::Timeout => FailureReason::Timeout,
        GitError::Cancelled => FailureReason::Cancelled,
        GitError::Process { code, stderr } => FailureReason::Process {
            exit_code: code,
            stderr,
        },
        GitError::Io(e) => FailureReason::Setup {
            message: e.to_string(),
        },
        GitError::InvalidInput(message) => FailureReason::Setup { message },
    };
    SyncAction::Failed { reason }
}
