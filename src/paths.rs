//! Target directory path management
//!
//! This module provides the `SyncPaths` struct which manages all filesystem
//! paths under the target root:
//!
//! ```text
//! ~/github/
//! ├── <owner>/
//! │   └── <repo>/                    # Full working clone
//! └── .ghsync/
//!     └── locks/
//!         └── <owner>__<repo>.lock   # flock-based locking
//! ```

use std::path::{Path, PathBuf};

use crate::types::RepoKey;

/// Manages all filesystem paths under the sync target root
#[derive(Debug, Clone)]
pub struct SyncPaths {
    root: PathBuf,
}

impl SyncPaths {
    /// Creates a new SyncPaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the target root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the locks directory path: `{root}/.ghsync/locks`
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(".ghsync").join("locks")
    }

    /// Returns the local clone path for a repository: `{root}/{owner}/{repo}`
    pub fn repo_dir(&self, key: &RepoKey) -> PathBuf {
        self.root
            .join(key.owner.as_str())
            .join(key.repo.as_str())
    }

    /// Returns the lock file path: `{root}/.ghsync/locks/{owner}__{repo}.lock`
    pub fn lock_path(&self, key: &RepoKey) -> PathBuf {
        self.locks_dir().join(format!(
            "{}__{}.lock",
            key.owner.as_str(),
            key.repo.as_str()
        ))
    }
}

impl Default for SyncPaths {
    /// Creates a SyncPaths rooted at `~/github`
    ///
    /// Falls back to `./github` when the home directory cannot be determined.
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join("github"))
    }
}
