//! Exclusive system lock
//!
//! Native managers serialise on an advisory lock file. dpkg and apt hold
//! it with `fcntl` record locks, so it is taken the same way: an open file
//! description lock on Linux, which conflicts with their record locks but
//! stays private to the guard's own descriptor. The lock is taken with a
//! bounded wait and released when the guard drops.

use pkgd_errors::TransactionError;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct SystemLock;

impl SystemLock {
    /// Take the lock at `path`, retrying every `retry` until `wait` elapsed.
    ///
    /// A zero `wait` makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::LockUnavailable` if the file cannot be
    /// opened or another holder keeps the lock past the deadline.
    pub async fn acquire(
        path: &Path,
        wait: Duration,
        retry: Duration,
    ) -> Result<LockGuard, TransactionError> {
        let unavailable = |message: String| TransactionError::LockUnavailable {
            path: path.display().to_string(),
            message,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| unavailable(e.to_string()))?;

        let deadline = Instant::now() + wait;
        loop {
            match set_record_lock(&file, WRITE_LOCK) {
                Ok(true) => {
                    debug!(path = %path.display(), "acquired system lock");
                    return Ok(LockGuard {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Ok(false) => {
                    if Instant::now() >= deadline {
                        warn!(path = %path.display(), "system lock is held by another process");
                        return Err(unavailable(
                            "another package manager is holding the lock".to_string(),
                        ));
                    }
                    tokio::time::sleep(retry.min(deadline.saturating_duration_since(Instant::now())))
                        .await;
                }
                Err(e) => return Err(unavailable(e.to_string())),
            }
        }
    }
}

/// RAII guard for the system lock - releases on drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    file: File,
}

impl LockGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Best-effort; closing the file releases the lock anyway
        let _ = set_record_lock(&self.file, UNLOCK);
        debug!(path = %self.path.display(), "released system lock");
    }
}

#[allow(clippy::cast_possible_truncation)]
const WRITE_LOCK: libc::c_short = libc::F_WRLCK as libc::c_short;
#[allow(clippy::cast_possible_truncation)]
const UNLOCK: libc::c_short = libc::F_UNLCK as libc::c_short;

#[cfg(target_os = "linux")]
const SET_LOCK: libc::c_int = libc::F_OFD_SETLK;
#[cfg(not(target_os = "linux"))]
const SET_LOCK: libc::c_int = libc::F_SETLK;

/// Place or release a whole-file record lock without waiting.
///
/// Returns `Ok(false)` when another holder has a conflicting lock.
#[allow(unsafe_code, clippy::cast_possible_truncation)]
fn set_record_lock(file: &File, kind: libc::c_short) -> io::Result<bool> {
    // SAFETY: an all-zero flock is a valid value (offset 0, length 0 means
    // the whole file, pid 0 as open file description locks require).
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = kind;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    // SAFETY: the descriptor is owned by `file` and `lock` outlives the call.
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), SET_LOCK, std::ptr::addr_of!(lock)) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EACCES | libc::EAGAIN) => Ok(false),
        _ => Err(err),
    }
}
