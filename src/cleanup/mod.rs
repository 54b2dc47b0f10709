//! Daily reclamation of aged build directories and orphaned queue locks
//! (spec.md §4.5), plus a synchronous run-now entry point for the
//! `POST /cleanup` endpoint.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{Datelike, Local, TimeZone};

use crate::job::JobsTable;

/// Orphaned-lock age threshold (spec.md §3: "untouched for more than 24
/// hours").
const ORPHAN_LOCK_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupReport {
    pub deleted_builds: usize,
    pub freed_bytes: u64,
    pub deleted_locks: usize,
}

fn age(mtime: SystemTime) -> Option<Duration> {
    SystemTime::now().duration_since(mtime).ok()
}

fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Delete build directories under `builds_dir` older than `max_age`,
/// skipping any directory whose job is still `running` per `jobs`
/// (spec.md §9 open question: cleanup never races a live job).
pub fn cleanup_old_builds(builds_dir: &Path, max_age: Duration, jobs: &JobsTable) -> CleanupReport {
    let mut report = CleanupReport::default();

    let entries = match fs::read_dir(builds_dir) {
        Ok(entries) => entries,
        Err(_) => return report,
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let job_id = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if jobs.is_running(job_id) {
            continue;
        }

        let mtime = match entry.metadata().and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let Some(elapsed) = age(mtime) else { continue };
        if elapsed < max_age {
            continue;
        }

        let size = dir_size(&path);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                report.deleted_builds += 1;
                report.freed_bytes += size;
            }
            Err(e) => eprintln!("[cleanup] failed to delete {}: {e}", path.display()),
        }
    }

    report
}

/// Unlink queue-lock files older than [`ORPHAN_LOCK_AGE`] (spec.md §3/§4.5).
pub fn cleanup_orphaned_locks(queue_locks_dir: &Path) -> usize {
    let mut deleted = 0;

    let entries = match fs::read_dir(queue_locks_dir) {
        Ok(entries) => entries,
        Err(_) => return deleted,
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }
        let mtime = match entry.metadata().and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let Some(elapsed) = age(mtime) else { continue };
        if elapsed <= ORPHAN_LOCK_AGE {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) => eprintln!("[cleanup] failed to delete lock {}: {e}", path.display()),
        }
    }

    deleted
}

/// Run both sweeps once, synchronously. Used by manual triggers and by
/// the scheduler below.
pub fn manual_cleanup(builds_dir: &Path, queue_locks_dir: &Path, cleanup_days: u64, jobs: &JobsTable) -> CleanupReport {
    let max_age = Duration::from_secs(cleanup_days * 24 * 60 * 60);
    let mut report = cleanup_old_builds(builds_dir, max_age, jobs);
    report.deleted_locks = cleanup_orphaned_locks(queue_locks_dir);
    report
}

/// Seconds to sleep until the next local 03:00, computed against the
/// host's local timezone (spec.md §9 open question resolution).
pub fn seconds_until_next_run() -> u64 {
    let now = Local::now();
    let today_3am = Local
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 3, 0, 0)
        .single();

    let next = match today_3am {
        Some(t) if t > now => t,
        _ => (now.date_naive() + chrono::Duration::days(1))
            .and_hms_opt(3, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .unwrap_or(now),
    };

    (next - now).num_seconds().max(0) as u64
}

/// Blocking scheduler loop: wakes daily at local 03:00 and runs both
/// sweeps. Intended to run on its own background thread for the
/// lifetime of the process.
pub fn run_scheduler(builds_dir: &Path, queue_locks_dir: &Path, cleanup_days: u64, jobs: &JobsTable) -> ! {
    eprintln!("[cleanup] scheduler started (daily at 03:00, keeping {cleanup_days} days)");
    loop {
        let wait = seconds_until_next_run();
        std::thread::sleep(Duration::from_secs(wait.min(60)));
        if wait > 60 {
            continue;
        }
        let report = manual_cleanup(builds_dir, queue_locks_dir, cleanup_days, jobs);
        eprintln!(
            "[cleanup] swept {} builds ({} bytes freed), {} orphaned locks",
            report.deleted_builds, report.freed_bytes, report.deleted_locks
        );
        std::thread::sleep(Duration::from_secs(60));
    }
}
