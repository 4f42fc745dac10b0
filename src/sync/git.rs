//! Git subprocess wrapper with security hardening and bounded execution.
//!
//! All mutating repository operations (clone, fetch, merge) go through the
//! system `git` binary. Control decisions come from exit codes only; stdout is
//! discarded, and stderr is captured solely for diagnostics. Every spawned
//! process is bounded by a per-operation timeout and killed on timeout or
//! run-level cancellation, so no orphan survives this wrapper.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How much of a failing process's stderr is kept in the outcome.
const STDERR_TAIL_BYTES: usize = 4096;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// The process exceeded the per-operation timeout and was killed.
    #[error("git operation timed out")]
    Timeout,
    /// The run was cancelled while the process was in flight.
    #[error("git operation cancelled")]
    Cancelled,
    /// The process exited non-zero.
    #[error("git exited with {code:?}: {stderr}")]
    Process {
        code: Option<i32>,
        stderr: String,
    },
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a git ref (branch name) does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
fn validate_git_ref(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b == 0 || b < 0x20) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

/// Validate that a clone endpoint is safe to pass on a command line.
fn validate_clone_url(value: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput("clone url cannot be empty".into()));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(
            "clone url cannot start with '-'".into(),
        ));
    }
    if value.bytes().any(|b| b == 0 || b < 0x20) {
        return Err(GitError::InvalidInput(
            "clone url cannot contain null or control characters".into(),
        ));
    }
    Ok(())
}

struct ProcessOutput {
    status: ExitStatus,
    stderr: String,
}

/// Git CLI wrapper with security hardening and a per-operation timeout.
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl GitCli {
    /// Create a new GitCli using the system git and the given per-operation
    /// timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".into(),
            timeout,
        }
    }

    /// Override the executable, for simulating hangs and failures.
    #[cfg(test)]
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Clone a repository into `dest` (one process).
    ///
    /// A destination created by a failed clone is removed so a later run sees
    /// the path as absent rather than corrupt.
    pub fn clone_repo(&self, url: &str, dest: &Path, cancel: &AtomicBool) -> Result<(), GitError> {
        validate_clone_url(url)?;

        let dest_existed = dest.exists();
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cmd = self.command();
        cmd.args(["clone", "--"]).arg(url).arg(dest);

        let result = self.run_bounded(cmd, cancel);
        match result {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                if !dest_existed {
                    let _ = std::fs::remove_dir_all(dest);
                }
                Err(GitError::Process {
                    code: output.status.code(),
                    stderr: output.stderr,
                })
            }
            Err(err) => {
                if !dest_existed {
                    let _ = std::fs::remove_dir_all(dest);
                }
                Err(err)
            }
        }
    }

    /// Fetch all remote refs from origin, pruning deleted ones (one process).
    pub fn fetch(&self, repo_dir: &Path, cancel: &AtomicBool) -> Result<(), GitError> {
        let mut cmd = self.command();
        cmd.arg("-C")
            .arg(repo_dir)
            .args(["fetch", "--prune", "origin"]);

        let output = self.run_bounded(cmd, cancel)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::Process {
                code: output.status.code(),
                stderr: output.stderr,
            })
        }
    }

    /// Fast-forward-only merge of the remote default branch (one process).
    ///
    /// Fails rather than reconciling when histories have diverged.
    pub fn merge_ff_only(
        &self,
        repo_dir: &Path,
        branch: &str,
        cancel: &AtomicBool,
    ) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;

        let mut cmd = self.command();
        cmd.arg("-C")
            .arg(repo_dir)
            .args(["merge", "--ff-only"])
            .arg(format!("refs/remotes/origin/{}", branch));

        let output = self.run_bounded(cmd, cancel)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::Process {
                code: output.status.code(),
                stderr: output.stderr,
            })
        }
    }

    /// Spawn the command and wait for it, bounded by the timeout and the
    /// cancellation flag. The child is killed and reaped on either.
    fn run_bounded(&self, mut cmd: Command, cancel: &AtomicBool) -> Result<ProcessOutput, GitError> {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        // Drain stderr on a helper thread so a chatty child never blocks on a
        // full pipe while we poll for exit.
        let stderr_pipe = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let mut sleep_duration = Duration::from_millis(10);
        let max_sleep = Duration::from_millis(200);

        loop {
            if let Some(status) = child.try_wait()? {
                let buf = reader.join().unwrap_or_default();
                return Ok(ProcessOutput {
                    status,
                    stderr: stderr_tail(&buf),
                });
            }

            if cancel.load(Ordering::Relaxed) {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(GitError::Cancelled);
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(GitError::Timeout);
            }

            thread::sleep(sleep_duration);
            sleep_duration = (sleep_duration * 2).min(max_sleep);
        }
    }
}

/// Keep the last `STDERR_TAIL_BYTES` of a process's stderr, lossily decoded.
fn stderr_tail(buf: &[u8]) -> String {
    let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&buf[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testutil;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn cli() -> GitCli {
        GitCli::new(Duration::from_secs(30))
    }

    #[test]
    fn validate_git_ref_rejects_empty() {
        assert!(matches!(
            validate_git_ref("", "branch"),
            Err(GitError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_git_ref_rejects_path_traversal() {
        assert!(matches!(
            validate_git_ref("foo/../bar", "branch"),
            Err(GitError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_git_ref_rejects_leading_dash() {
        assert!(matches!(
            validate_git_ref("-malicious", "branch"),
            Err(GitError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_git_ref_accepts_valid_refs() {
        assert!(validate_git_ref("main", "branch").is_ok());
        assert!(validate_git_ref("feature/my-branch", "branch").is_ok());
        assert!(validate_git_ref("v1.0.0", "branch").is_ok());
    }

    #[test]
    fn validate_clone_url_rejects_leading_dash() {
        assert!(matches!(
            validate_clone_url("--upload-pack=evil"),
            Err(GitError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_clone_url_accepts_ssh_form() {
        assert!(validate_clone_url("git@github.com:octocat/hello-world.git").is_ok());
    }

    #[test]
    fn stderr_tail_keeps_short_output_whole() {
        assert_eq!(stderr_tail(b"fatal: oops\n"), "fatal: oops\n");
    }

    #[test]
    fn stderr_tail_truncates_long_output() {
        let big = vec![b'x'; STDERR_TAIL_BYTES * 3];
        let tail = stderr_tail(&big);
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
    }

    #[test]
    fn clone_repo_clones_local_origin() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("origin");
        testutil::init_repo_with_commit(&origin);

        let dest = dir.path().join("mirror");
        cli()
            .clone_repo(origin.to_str().unwrap(), &dest, &no_cancel())
            .expect("clone failed");

        assert!(dest.join(".git").exists());
        assert!(dest.join("README.md").exists());
    }

    #[test]
    fn clone_repo_failure_reports_stderr_and_cleans_up() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("mirror");
        let missing = dir.path().join("does-not-exist");

        let result = cli().clone_repo(missing.to_str().unwrap(), &dest, &no_cancel());

        match result {
            Err(GitError::Process { code, stderr }) => {
                assert_ne!(code, Some(0));
                assert!(!stderr.is_empty());
            }
            other => panic!("expected process failure, got {:?}", other),
        }
        assert!(!dest.exists(), "failed clone should not leave a destination");
    }

    #[test]
    fn fetch_succeeds_on_fresh_clone() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("origin");
        testutil::init_repo_with_commit(&origin);
        let local = dir.path().join("local");
        testutil::clone(&origin, &local);

        cli().fetch(&local, &no_cancel()).expect("fetch failed");
    }

    #[test]
    fn merge_ff_only_fast_forwards_behind_clone() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("origin");
        testutil::init_repo_with_commit(&origin);
        let local = dir.path().join("local");
        testutil::clone(&origin, &local);

        testutil::commit_file(&origin, "new.txt", "new content");
        let git = cli();
        git.fetch(&local, &no_cancel()).expect("fetch failed");
        git.merge_ff_only(&local, "main", &no_cancel())
            .expect("merge failed");

        assert!(local.join("new.txt").exists());
    }

    #[test]
    fn merge_ff_only_fails_on_diverged_history() {
        let dir = tempdir().unwrap();
        let origin = dir.path().join("origin");
        testutil::init_repo_with_commit(&origin);
        let local = dir.path().join("local");
        testutil::clone(&origin, &local);

        testutil::commit_file(&origin, "remote.txt", "remote side");
        testutil::commit_file(&local, "local.txt", "local side");

        let git = cli();
        git.fetch(&local, &no_cancel()).expect("fetch failed");
        let result = git.merge_ff_only(&local, "main", &no_cancel());
        assert!(matches!(result, Err(GitError::Process { .. })));
    }

    #[test]
    fn run_bounded_kills_hung_process_on_timeout() {
        let dir = tempdir().unwrap();
        let script = testutil::hang_script(dir.path());

        let git = GitCli::with_program(script.to_str().unwrap(), Duration::from_millis(200));
        let start = Instant::now();
        let result = git.fetch(dir.path(), &no_cancel());

        assert!(matches!(result, Err(GitError::Timeout)));
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timeout should fire long before the hang finishes"
        );

        // The stub recorded its PID before sleeping; the wait loop must have
        // killed and reaped it, not just returned early.
        let pid = std::fs::read_to_string(dir.path().join("hang.pid"))
            .expect("stub never started")
            .trim()
            .to_string();
        assert!(
            !testutil::process_alive(&pid),
            "timed-out child {} was left running",
            pid
        );
    }

    #[test]
    fn run_bounded_kills_process_on_cancellation() {
        let dir = tempdir().unwrap();
        let script = testutil::hang_script(dir.path());

        let git = GitCli::with_program(script.to_str().unwrap(), Duration::from_secs(60));
        let cancel = AtomicBool::new(false);

        let start = Instant::now();
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(100));
                cancel.store(true, Ordering::Relaxed);
            });
            let result = git.fetch(dir.path(), &cancel);
            assert!(matches!(result, Err(GitError::Cancelled)));
        });
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
