//! Job identity, state machine, and the process-wide jobs table.
//!
//! Per the redesign flags (spec.md §9): a job is a typed record with
//! explicit fields, not a dict of heterogeneous values, and live
//! subprocess handles are never handed directly to the status-query path.

use std::collections::BTreeMap;
use std::process::Child;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use mbo_protocol::job::{JobState as WireJobState, PlatformProgress, StageStatus, StepRecord};
use thiserror::Error;

/// Job lifecycle state.
///
/// `pending → running → {completed, failed}`; terminal states absorb.
/// There is no `cancelling`/`cancelled` state: cancellation is an
/// explicit non-goal (spec.md §4.4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, target: JobState) -> bool {
        matches!(
            (self, target),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
        )
    }

    pub fn to_wire(self) -> WireJobState {
        match self {
            Self::Pending => WireJobState::Pending,
            Self::Running => WireJobState::Running,
            Self::Completed => WireJobState::Completed,
            Self::Failed => WireJobState::Failed,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobStateError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },
}

/// Immutable identity and request parameters for a job. Set once at
/// admission and never mutated afterward.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub flavor: String,
    pub platform: String,
    pub build_name: Option<String>,
    pub build_number: Option<String>,
    pub branch_name: String,
    pub fvm_flavor: Option<String>,
    pub queue_key: String,
    pub started_at: DateTime<Utc>,
}

/// A live (not-yet-waited) stage subprocess handle plus its name.
pub struct StageHandle {
    pub name: &'static str,
    pub child: Child,
}

/// Resolved toolchain versions for the job, loaded from `fvm_flavors.json`
/// (spec.md §4.4.2). Each field is `None` when not resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolvedVersions {
    pub flutter_version: Option<String>,
    pub cocoapods_version: Option<String>,
    pub fastlane_version: Option<String>,
    pub gradle_version: Option<String>,
}

/// Mutable runtime state for a job: the Build Service's exclusive
/// ownership of its child-process handles, progress, and log tail.
pub struct JobRuntime {
    pub state: JobState,
    pub versions: ResolvedVersions,
    pub stage_status: BTreeMap<String, StageStatus>,
    pub progress: BTreeMap<String, PlatformProgress>,
    pub logs: Vec<String>,
    pub log_file_path: String,
}

impl JobRuntime {
    pub fn new(log_file_path: String) -> Self {
        Self {
            state: JobState::Pending,
            versions: ResolvedVersions::default(),
            stage_status: BTreeMap::new(),
            progress: BTreeMap::new(),
            logs: Vec::new(),
            log_file_path,
        }
    }

    pub fn transition(&mut self, target: JobState) -> Result<(), JobStateError> {
        if !self.state.can_transition_to(target) {
            return Err(JobStateError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    /// Append a log line to the in-memory tail, trimming per spec.md
    /// §4.4.1/§4.4.5 (truncate to the last 400 once 500 is exceeded).
    pub fn push_log(&mut self, line: String) {
        const MAX_LOG_LINES: usize = 500;
        const KEEP_LOG_LINES: usize = 400;
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            let start = self.logs.len() - KEEP_LOG_LINES;
            self.logs.drain(0..start);
        }
    }

    pub fn progress_for(&mut self, platform: &str) -> &mut PlatformProgress {
        self.progress.entry(platform.to_string()).or_default()
    }

    pub fn record_step(&mut self, platform: &str, step: StepRecord) {
        self.progress_for(platform).steps_completed.push(step);
    }
}

/// One job: identity plus mutex-guarded runtime state.
pub struct Job {
    pub record: JobRecord,
    pub runtime: Mutex<JobRuntime>,
}

/// The process-wide jobs map. Written by admission and status-promotion,
/// read by status queries — a single mutex per spec.md §5.
#[derive(Default)]
pub struct JobsTable {
    inner: Mutex<BTreeMap<String, Arc<Job>>>,
}

impl JobsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<Job>) {
        self.inner
            .lock()
            .expect("jobs table mutex poisoned")
            .insert(job.record.job_id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<Job>> {
        self.inner
            .lock()
            .expect("jobs table mutex poisoned")
            .get(job_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<Job>> {
        self.inner
            .lock()
            .expect("jobs table mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Whether any job still owns `job_id` as `running` — consulted by the
    /// cleanup sweep before deleting a build directory (spec.md §4.5).
    pub fn is_running(&self, job_id: &str) -> bool {
        self.get(job_id)
            .map(|job| job.runtime.lock().expect("runtime mutex poisoned").state == JobState::Running)
            .unwrap_or(false)
    }
}

/// `job_id = "<flavor>-<platform>-<YYYYMMDD-HHMMSS>"` (spec.md §3).
pub fn generate_job_id(flavor: &str, platform: &str, now: DateTime<Utc>) -> String {
    format!("{flavor}-{platform}-{}", now.format("%Y%m%d-%H%M%S"))
}
