//! Read-only inspection of a local repository path.
//!
//! Classification uses git2 directly rather than parsing subprocess output,
//! so the clone-or-update decision never depends on git's human-facing text.

use std::path::Path;

use git2::{ErrorCode, Repository, StatusOptions};

/// What exists at a repository's target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    /// Nothing at the path (or an empty directory); safe to clone into.
    Absent,
    /// A valid repository with no uncommitted changes.
    Clean,
    /// A valid repository with uncommitted work in the tree or index.
    Dirty,
    /// Something is there but git cannot read it as a repository.
    Corrupt,
}

/// Where the local checkout stands relative to the remote default branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchPosition {
    UpToDate,
    /// Remote has commits the local branch lacks; fast-forward applies.
    Behind,
    /// Local has commits the remote lacks; nothing to pull.
    Ahead,
    /// Both sides have commits the other lacks.
    Diverged,
    /// No local head or no remote-tracking ref to compare against.
    NoUpstream,
}

/// Classify what exists at `path`.
///
/// Untracked files do not count as dirty: a stray build artifact must not
/// block a fast-forward. Unreadable paths classify as corrupt rather than
/// erroring, since the caller's response is the same either way.
pub fn inspect(path: &Path) -> LocalState {
    if !path.exists() {
        return LocalState::Absent;
    }

    // An empty directory is as good as absent; git clone accepts it.
    match std::fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                return LocalState::Absent;
            }
        }
        Err(_) => return LocalState::Corrupt,
    }

    let repo = match Repository::open(path) {
        Ok(repo) => repo,
        Err(_) => return LocalState::Corrupt,
    };

    if repo.is_bare() {
        return LocalState::Clean;
    }

    let mut options = StatusOptions::new();
    options.include_untracked(false).include_ignored(false);

    match repo.statuses(Some(&mut options)) {
        Ok(statuses) if statuses.is_empty() => LocalState::Clean,
        Ok(_) => LocalState::Dirty,
        Err(_) => LocalState::Corrupt,
    }
}

/// Compare the local head against `refs/remotes/origin/<branch>`.
///
/// Call after a fetch so the remote-tracking ref is current.
pub fn branch_position(path: &Path, branch: &str) -> Result<BranchPosition, git2::Error> {
    let repo = Repository::open(path)?;

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(BranchPosition::NoUpstream),
        Err(e) => return Err(e),
    };
    let Some(local_oid) = head.target() else {
        return Ok(BranchPosition::NoUpstream);
    };

    let remote_ref = format!("refs/remotes/origin/{}", branch);
    let remote_oid = match repo.find_reference(&remote_ref) {
        Ok(reference) => reference.peel_to_commit()?.id(),
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(BranchPosition::NoUpstream),
        Err(e) => return Err(e),
    };

    let (ahead, behind) = repo.graph_ahead_behind(local_oid, remote_oid)?;
    Ok(match (ahead, behind) {
        (0, 0) => BranchPosition::UpToDate,
        (0, _) => BranchPosition::Behind,
        (_, 0) => BranchPosition::Ahead,
        _ => BranchPosition::Diverged,
    })
}
