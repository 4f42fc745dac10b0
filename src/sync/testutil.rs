//! Fixture helpers that drive the system git binary directly.
//!
//! Kept separate from `GitCli` so fixtures never depend on the code under
//! test. All helpers panic on failure; a broken fixture is a broken test.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Run git in `dir` with the given args, asserting success.
pub(crate) fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "user.name=Fixture",
        ])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initialize a repository at `dir` with a `main` branch and one commit.
pub(crate) fn init_repo_with_commit(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "-q", "-b", "main"]);
    commit_file(dir, "README.md", "fixture repository\n");
}

/// Write `contents` to `name` in `dir` and commit it.
pub(crate) fn commit_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
    git(dir, &["add", name]);
    git(dir, &["commit", "-q", "-m", &format!("add {}", name)]);
}

/// Clone `origin` to `dest` using the system git.
pub(crate) fn clone(origin: &Path, dest: &Path) {
    let output = Command::new("git")
        .arg("clone")
        .arg("-q")
        .arg(origin)
        .arg(dest)
        .output()
        .expect("failed to run git clone");
    assert!(
        output.status.success(),
        "git clone failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Write an executable script that records its PID next to itself (as
/// `hang.pid`) and then sleeps far longer than any test timeout.
#[cfg(unix)]
pub(crate) fn hang_script(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("hang.sh");
    std::fs::write(&path, "#!/bin/sh\necho $$ > \"${0%/*}/hang.pid\"\nexec sleep 60\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// True while the process with `pid` exists (signal 0 probe).
#[cfg(unix)]
pub(crate) fn process_alive(pid: &str) -> bool {
    Command::new("kill")
        .args(["-0", pid])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
