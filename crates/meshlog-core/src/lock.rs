//! Advisory lock on the database directory.
//!
//! `nodes2eventlog` holds the lock exclusively for its whole
//! load/mutate/persist cycle. `graveyard2rst` holds it shared while it loads
//! the archive, so a report never reads tables a run is about to replace.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::ErrorCode;

/// Default wait before a contended database lock is reported as an error.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("database lock {path} still held after {waited:?}")]
    Contended { path: PathBuf, waited: Duration },

    #[error("cannot open database lock {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Contended { .. } => ErrorCode::LockContention,
            Self::Io { .. } => ErrorCode::StoreWriteFailed,
        }
    }
}

/// How the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Report readers; any number may hold it together.
    Shared,
    /// A folding run; excludes everyone else.
    Exclusive,
}

/// Held lock on the database directory, released on drop.
#[derive(Debug)]
pub struct DbLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl DbLock {
    /// Take the lock at `path`, retrying until `timeout` has passed.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_err)?;

        let started = Instant::now();
        let mut announced = false;
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => break,
                Err(err) if err.kind() != io::ErrorKind::WouldBlock && !is_contention(&err) => {
                    return Err(io_err(err));
                }
                Err(_) => {}
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Contended {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            if !announced {
                debug!(path = %path.display(), ?mode, "waiting for database lock");
                announced = true;
            }
            thread::sleep(RETRY_INTERVAL);
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    pub fn exclusive(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(path, LockMode::Exclusive, timeout)
    }

    pub fn shared(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(path, LockMode::Shared, timeout)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// fs2 reports contention as its own error on some platforms.
fn is_contention(err: &io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(30);

    fn lock_path() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("db")).unwrap();
        let path = store.lock_path();
        (dir, path)
    }

    #[test]
    fn run_lock_is_reacquirable_after_release() {
        let (_dir, path) = lock_path();
        let run = DbLock::exclusive(&path, SHORT).unwrap();
        assert_eq!(run.path(), path.as_path());
        assert_eq!(run.mode(), LockMode::Exclusive);
        assert!(path.is_file());
        drop(run);

        DbLock::exclusive(&path, SHORT).unwrap();
    }

    #[test]
    fn concurrent_run_reports_contention() {
        let (_dir, path) = lock_path();
        let _run = DbLock::exclusive(&path, SHORT).unwrap();

        let err = DbLock::exclusive(&path, SHORT).unwrap_err();
        assert!(matches!(err, LockError::Contended { ref path, .. } if path.ends_with("lock")));
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.code().hint().is_some());
    }

    #[test]
    fn report_readers_share_the_lock() {
        let (_dir, path) = lock_path();
        let _first = DbLock::shared(&path, SHORT).unwrap();
        let _second = DbLock::shared(&path, SHORT).unwrap();
        assert!(matches!(
            DbLock::exclusive(&path, SHORT),
            Err(LockError::Contended { .. })
        ));
    }

    #[test]
    fn report_waits_out_a_short_run() {
        let (_dir, path) = lock_path();
        let run = DbLock::exclusive(&path, SHORT).unwrap();

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(run);
        });
        let started = Instant::now();
        let report = DbLock::shared(&path, Duration::from_secs(5)).unwrap();
        releaser.join().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(report.mode(), LockMode::Shared);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = DbLock::exclusive(&dir.path().join("absent/lock"), SHORT).unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
        assert_eq!(err.code(), ErrorCode::StoreWriteFailed);
    }
}
