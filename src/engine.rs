//! Run orchestration: fan repositories out to the worker pool and fold the
//! per-repository outcomes into one report.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::paths::SyncPaths;
use crate::pool;
use crate::report::RunReport;
use crate::sync::{GitCli, SyncExecutor};
use crate::types::RepoDescriptor;

/// Default worker count; sized for network-bound git processes.
pub const DEFAULT_JOBS: usize = 8;

/// Default per-git-operation timeout.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(600);

/// Settings for one synchronization run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub target_root: PathBuf,
    pub jobs: usize,
    pub op_timeout: Duration,
}

/// Drives a whole run: one sync job per repository descriptor, bounded
/// concurrency, outcomes folded into a `RunReport` in completion order.
pub struct Engine {
    executor: SyncExecutor,
    jobs: usize,
}

impl Engine {
    pub fn new(config: EngineConfig, cancel: Arc<AtomicBool>) -> Self {
        let executor = SyncExecutor::new(
            GitCli::new(config.op_timeout),
            SyncPaths::new(config.target_root),
            cancel,
        );
        Self {
            executor,
            jobs: config.jobs,
        }
    }

    /// Sync every descriptor and return the aggregated report.
    ///
    /// Never fails: each repository's outcome, success or not, lands in the
    /// report, and the pool drains the full list even when every job fails.
    pub fn run(&self, descriptors: Vec<RepoDescriptor>) -> RunReport {
        let total = descriptors.len();
        log::info!("syncing {} repositories with {} workers", total, self.jobs);

        let mut report = RunReport::new();
        let mut done = 0usize;

        let outcomes = pool::run(
            descriptors,
            self.jobs,
            |desc| self.executor.sync(&desc),
            |outcome| {
                done += 1;
                log::debug!(
                    "[{}/{}] {} {}",
                    done,
                    total,
                    outcome.repo,
                    outcome.action.label()
                );
            },
        );

        for outcome in outcomes {
            report.record(outcome);
        }
        report
    }
}
