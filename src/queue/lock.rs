//! Advisory file locking shared by queue-key serialization and shared-cache
//! first-creation guarding.
//!
//! Generalized from a cache-directory lock into a lock over any single
//! file path: exclusive, timeout-bound, contention is logged once.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock timeout after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A held exclusive lock on a file. Released when dropped.
pub struct FileLock {
    lock_path: PathBuf,
    #[allow(dead_code)]
    lock_file: File,
}

impl FileLock {
    /// Acquire an exclusive lock on `lock_path`, creating its parent
    /// directory and the file itself if needed. Polls every 50ms up to
    /// `timeout`, warning once if contention exceeds 500ms.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> LockResult<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);
        let mut warned = false;

        loop {
            match Self::try_acquire_exclusive(lock_path) {
                Ok(file) => {
                    if warned {
                        eprintln!(
                            "[queue] lock acquired after {:.1}s contention: {}",
                            start.elapsed().as_secs_f64(),
                            lock_path.display()
                        );
                    }
                    return Ok(Self {
                        lock_path: lock_path.to_path_buf(),
                        lock_file: file,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > Duration::from_millis(500) {
                        eprintln!(
                            "[queue] WARNING: lock contention on {}, waiting...",
                            lock_path.display()
                        );
                        warned = true;
                    }
                }
                Err(e) => return Err(LockError::Io(e)),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout(timeout));
            }

            std::thread::sleep(poll_interval);
        }
    }

    #[cfg(unix)]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(lock_path)?;

        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        match OpenOptions::new().write(true).create_new(true).open(lock_path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.lock_file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_parent_and_file() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("nested").join("x.lock");
        let lock = FileLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn released_on_drop_allows_reacquire() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("x.lock");
        {
            let _lock = FileLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();
        }
        let _lock2 = FileLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn contended_lock_times_out() {
        use std::sync::mpsc;
        use std::thread;

        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("x.lock");
        let lock_path2 = lock_path.clone();

        let lock1 = FileLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = FileLock::acquire(&lock_path2, Duration::from_millis(100));
            tx.send(result.is_err()).unwrap();
        });

        assert!(rx.recv().unwrap(), "second lock acquisition should time out");
        handle.join().unwrap();
        drop(lock1);
    }
}
