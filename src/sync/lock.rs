//! Cross-invocation exclusivity for repository paths.
//!
//! Each repository path maps to one lock file under the target root's lock
//! directory (see `SyncPaths::lock_path`). Holding the flock makes the whole
//! clone-or-update sequence exclusive against other `ghsync` processes; the
//! in-process claim set in the executor handles duplicates within one run.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

/// Exclusive advisory lock on one repository path, released on drop.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
}

impl RepoLock {
    /// Take the lock at `lock_path`, waiting up to `timeout` for the current
    /// holder to let go. Missing parent directories are created. Expiry
    /// surfaces as `ErrorKind::TimedOut`; the executor reports that as the
    /// path being busy.
    pub fn acquire_with_timeout(lock_path: &Path, timeout: Duration) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        // flock has no deadline of its own, so poll, doubling the wait up to
        // half a second and never sleeping past the deadline.
        let deadline = Instant::now() + timeout;
        let mut wait = Duration::from_millis(10);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!(
                                "gave up on {} after {:?}",
                                lock_path.display(),
                                timeout
                            ),
                        ));
                    }
                    std::thread::sleep(wait.min(deadline - now));
                    wait = (wait * 2).min(Duration::from_millis(500));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
