//! Queue-key normalization and per-key serialization.
//!
//! `(flavor, branch, toolchain-version-key)` maps to a single queue key;
//! jobs sharing a key run one at a time, jobs with distinct keys run
//! concurrently. Serialization is a filesystem advisory lock, not an
//! in-memory mutex, so the scheme still holds if this process is ever
//! scaled to more than one instance sharing `workspace_root`.

pub mod lock;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use lock::{FileLock, LockError};

/// Queue-lock acquisition timeout (spec.md §4.2): 1 hour.
pub const QUEUE_LOCK_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue lock timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error acquiring queue lock: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LockError> for QueueError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout(d) => QueueError::Timeout(d),
            LockError::Io(io) => QueueError::Io(io),
        }
    }
}

fn normalize_component(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '/' | '.' | '-' => '_',
            other => other,
        })
        .collect()
}

/// Canonical queue key per spec.md §3: `<flavor>_<branch>_<version>`,
/// lowercase, with `/ . -` replaced by `_`. Missing branch becomes
/// `unknown`, missing toolchain-version-key becomes `default`.
pub fn queue_key(flavor: &str, branch: Option<&str>, toolchain_version_key: Option<&str>) -> String {
    let branch = branch.unwrap_or("unknown");
    let version = toolchain_version_key.unwrap_or("default");
    format!(
        "{}_{}_{}",
        normalize_component(flavor),
        normalize_component(branch),
        normalize_component(version)
    )
}

/// Path to the lock file backing `queue_key` under `workspace_root`.
pub fn lock_path(queue_locks_dir: &Path, queue_key: &str) -> PathBuf {
    queue_locks_dir.join(format!("{queue_key}.lock"))
}

/// Acquire the queue lock for `queue_key`, run `task`, then release —
/// mirroring the original `execute_with_queue(queue_key, job_id, task)`
/// contract (spec.md §4.2). The lock is released on every exit path of
/// `task`, including panics, since `FileLock` releases in `Drop`.
pub fn execute_with_queue<T>(
    queue_locks_dir: &Path,
    queue_key: &str,
    task: impl FnOnce() -> T,
) -> Result<T, QueueError> {
    let path = lock_path(queue_locks_dir, queue_key);
    let _lock = FileLock::acquire(&path, QUEUE_LOCK_TIMEOUT)?;
    Ok(task())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalizes_per_spec_example() {
        assert_eq!(
            queue_key("prod", Some("release/2.0"), Some("stable-3.29.3")),
            "prod_release_2_0_stable_3_29_3"
        );
    }

    #[test]
    fn missing_branch_and_version_use_defaults() {
        assert_eq!(queue_key("dev", None, None), "dev_unknown_default");
    }

    #[test]
    fn is_stable_for_identical_inputs() {
        let a = queue_key("dev", Some("develop"), Some("3.35.4"));
        let b = queue_key("dev", Some("develop"), Some("3.35.4"));
        assert_eq!(a, b);
    }

    #[test]
    fn execute_with_queue_serializes_colliding_keys() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::thread;

        let dir = TempDir::new().unwrap();
        let locks_dir = dir.path().to_path_buf();
        let counter = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks_dir = locks_dir.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(thread::spawn(move || {
                execute_with_queue(&locks_dir, "dev_develop_default", || {
                    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
