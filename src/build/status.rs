//! Conversion from internal job state to the wire snapshot/summary types.

use mbo_protocol::job::{JobSnapshot, JobSummary};

use crate::job::Job;

/// Build the full status snapshot for `GET /build/{id}` (spec.md §4.4.6).
pub fn snapshot(job: &Job) -> JobSnapshot {
    let runtime = job.runtime.lock().expect("runtime mutex poisoned");
    JobSnapshot {
        job_id: job.record.job_id.clone(),
        status: runtime.state.to_wire(),
        started_at: job.record.started_at,
        flavor: job.record.flavor.clone(),
        platform: job.record.platform.clone(),
        fvm_flavor: job.record.fvm_flavor.clone(),
        branch_name: job.record.branch_name.clone(),
        build_name: job.record.build_name.clone(),
        build_number: job.record.build_number.clone(),
        queue_key: job.record.queue_key.clone(),
        stages: runtime.stage_status.clone(),
        progress: runtime.progress.clone(),
        logs: runtime.logs.clone(),
        log_file_path: runtime.log_file_path.clone(),
    }
}

/// Build the abbreviated summary used by `GET /builds`.
pub fn summary(job: &Job) -> JobSummary {
    let runtime = job.runtime.lock().expect("runtime mutex poisoned");
    JobSummary {
        job_id: job.record.job_id.clone(),
        status: runtime.state.to_wire(),
        started_at: job.record.started_at,
        flavor: job.record.flavor.clone(),
        platform: job.record.platform.clone(),
        fvm_flavor: job.record.fvm_flavor.clone(),
        branch_name: job.record.branch_name.clone(),
        build_name: job.record.build_name.clone(),
        build_number: job.record.build_number.clone(),
        queue_key: job.record.queue_key.clone(),
    }
}
