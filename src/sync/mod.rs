//! Clone-or-update machinery for one repository at a time.

mod executor;
mod git;
mod lock;
mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use executor::SyncExecutor;
pub use git::{GitCli, GitError};
pub use lock::RepoLock;
pub use state::{BranchPosition, LocalState};
