//! Admission-side concurrency cap (`MAX_PARALLEL_BUILDS`, spec.md §5).
//!
//! One worker thread per job, not a fixed thread pool — `BuildSemaphore`
//! just blocks a job's stages from starting once `max` others are
//! already running. There is no `std::sync::Semaphore` in std, so this
//! is the usual `Mutex<usize>` + `Condvar` hand-roll.

use std::sync::{Arc, Condvar, Mutex};

pub struct BuildSemaphore {
    max: usize,
    count: Mutex<usize>,
    condvar: Condvar,
}

impl BuildSemaphore {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max: max.max(1),
            count: Mutex::new(0),
            condvar: Condvar::new(),
        })
    }

    /// Block until a slot is free, then hold it until the returned guard
    /// is dropped.
    pub fn acquire(self: &Arc<Self>) -> BuildPermit {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        while *count >= self.max {
            count = self.condvar.wait(count).expect("semaphore mutex poisoned");
        }
        *count += 1;
        BuildPermit { semaphore: Arc::clone(self) }
    }
}

/// Held for the duration of one job's stage execution; releases the
/// slot and wakes one waiter on drop.
pub struct BuildPermit {
    semaphore: Arc<BuildSemaphore>,
}

impl Drop for BuildPermit {
    fn drop(&mut self) {
        let mut count = self.semaphore.count.lock().expect("semaphore mutex poisoned");
        *count -= 1;
        self.semaphore.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn caps_concurrent_holders_at_max() {
        let semaphore = BuildSemaphore::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let semaphore = Arc::clone(&semaphore);
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            handles.push(thread::spawn(move || {
                let _permit = semaphore.acquire();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn released_permit_unblocks_a_waiter() {
        let semaphore = BuildSemaphore::new(1);
        let first = semaphore.acquire();
        let semaphore2 = Arc::clone(&semaphore);
        let handle = thread::spawn(move || {
            let _second = semaphore2.acquire();
        });
        thread::sleep(Duration::from_millis(20));
        drop(first);
        handle.join().unwrap();
    }
}
