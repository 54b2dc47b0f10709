//! Shared job wire types: state enum, per-stage status, and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job lifecycle state, as observed externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Terminal states never change except via live-process promotion from
    /// `running` (see the status-query rules).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Liveness and exit-code snapshot for a single stage subprocess.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

/// Per-platform progress, updated as `PROGRESS:`/`STEP:` lines are parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformProgress {
    pub current_step: String,
    pub percentage: u32,
    pub current_message: String,
    pub steps_completed: Vec<StepRecord>,
}

/// One completed step, recorded from a `STEP:` line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Full job snapshot, returned by `GET /build/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobState,
    pub started_at: DateTime<Utc>,
    pub flavor: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fvm_flavor: Option<String>,
    pub branch_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    pub queue_key: String,
    pub stages: BTreeMap<String, StageStatus>,
    pub progress: BTreeMap<String, PlatformProgress>,
    pub logs: Vec<String>,
    pub log_file_path: String,
}

/// Abbreviated entry returned by `GET /builds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobState,
    pub started_at: DateTime<Utc>,
    pub flavor: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fvm_flavor: Option<String>,
    pub branch_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    pub queue_key: String,
}
