//! Admission: synchronous job creation plus the background worker that
//! carries a job from queue gate to terminal state (spec.md §4.4.1).

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use mbo_protocol::job::StageStatus;

use super::environment::setup_build_environment;
use super::log_file::BuildLogger;
use super::semaphore::BuildSemaphore;
use super::stages::{run_build_scripts, run_setup_script};
use super::toolchain::{apply_overrides, load_fvm_flavor_mapping, VersionOverrides};
use crate::config::{branch_env_fallback, home_dir, Config};
use crate::job::{generate_job_id, Job, JobRecord, JobRuntime, JobState, JobsTable};
use crate::queue::{execute_with_queue, queue_key};

/// Parameters supplied by whichever caller is admitting a job: the
/// webhook dispatcher (only `flavor`/`platform` set) or the manual
/// trigger endpoint (anything the caller wants to override).
#[derive(Debug, Clone, Default)]
pub struct AdmissionRequest {
    pub flavor: String,
    pub platform: String,
    pub build_name: Option<String>,
    pub build_number: Option<String>,
    pub branch_name: Option<String>,
    pub fvm_flavor: Option<String>,
    /// Explicit per-tool versions that override whatever `fvm_flavor`
    /// would otherwise map to (spec.md §4.4.2/§6).
    pub flutter_sdk_version: Option<String>,
    pub gradle_version: Option<String>,
    pub cocoapods_version: Option<String>,
    pub fastlane_version: Option<String>,
}

/// Admit `request`: block until a `MAX_PARALLEL_BUILDS` slot is free,
/// allocate identity, insert a `pending` record, and dispatch the
/// pipeline to a background thread. The slot is held by that thread
/// until the job reaches a terminal state. Returns the new `job_id`
/// once the job is queued on its own thread.
pub fn admit(
    config: Arc<Config>,
    jobs: Arc<JobsTable>,
    semaphore: Arc<BuildSemaphore>,
    request: AdmissionRequest,
) -> String {
    let permit = semaphore.acquire();
    let now = Utc::now();
    let job_id = generate_job_id(&request.flavor, &request.platform, now);
    let branch_name = request
        .branch_name
        .clone()
        .unwrap_or_else(|| branch_env_fallback(&request.flavor));

    let toolchain_key = request.fvm_flavor.clone();
    let key = queue_key(&request.flavor, Some(&branch_name), toolchain_key.as_deref());

    let record = JobRecord {
        job_id: job_id.clone(),
        flavor: request.flavor.clone(),
        platform: request.platform.clone(),
        build_name: request.build_name.clone(),
        build_number: request.build_number.clone(),
        branch_name: branch_name.clone(),
        fvm_flavor: request.fvm_flavor.clone(),
        queue_key: key.clone(),
        started_at: now,
    };

    let build_workspace = config.builds_dir().join(&job_id);
    let logger = BuildLogger::create(&build_workspace, &job_id)
        .expect("build workspace directory is writable");

    let job = Arc::new(Job {
        record,
        runtime: Mutex::new(JobRuntime::new(logger.path().display().to_string())),
    });
    jobs.insert(job.clone());

    let logger = Arc::new(logger);
    std::thread::spawn(move || {
        let _permit = permit;
        run_pipeline(config, job, logger, request);
    });

    job_id
}

fn run_pipeline(
    config: Arc<Config>,
    job: Arc<Job>,
    logger: Arc<BuildLogger>,
    request: AdmissionRequest,
) {
    let queue_locks_dir = config.queue_locks_dir();
    let queue_key = job.record.queue_key.clone();
    let job_id = job.record.job_id.clone();

    // No exception is allowed to tear down this worker silently (spec.md
    // §4.4.1) — a panic anywhere in `run_stages` (including a joined
    // stage thread's own panic) must still seal a terminal state.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        execute_with_queue(&queue_locks_dir, &queue_key, || run_stages(&config, &job, &logger, &request))
    }));

    let mut runtime = job.runtime.lock().expect("runtime mutex poisoned");
    match result {
        Ok(Ok(succeeded)) => {
            let target = if succeeded { JobState::Completed } else { JobState::Failed };
            if runtime.transition(target).is_err() {
                eprintln!("[build] {job_id}: invalid terminal transition to {target:?}");
            }
        }
        Ok(Err(e)) => {
            logger.log(&format!("[{job_id}] queue error: {e}"));
            let _ = runtime.transition(JobState::Failed);
        }
        Err(panic_payload) => {
            logger.log(&format!("[{job_id}] worker panicked: {}", panic_message(&panic_payload)));
            let _ = runtime.transition(JobState::Failed);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs with the queue lock held: resolve toolchain, assemble the
/// isolated environment, run setup then the platform stages. Returns
/// whether the job succeeded.
fn run_stages(config: &Config, job: &Arc<Job>, logger: &Arc<BuildLogger>, request: &AdmissionRequest) -> bool {
    let job_id = &job.record.job_id;

    {
        let mut runtime = job.runtime.lock().expect("runtime mutex poisoned");
        if runtime.transition(JobState::Running).is_err() {
            return false;
        }
    }

    let home = match home_dir() {
        Some(h) => h,
        None => {
            logger.log(&format!("[{job_id}] could not resolve HOME"));
            return false;
        }
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let mut versions = load_fvm_flavor_mapping(&cwd, request.fvm_flavor.as_deref());
    apply_overrides(
        &mut versions,
        VersionOverrides {
            flutter_sdk_version: request.flutter_sdk_version.as_deref(),
            gradle_version: request.gradle_version.as_deref(),
            cocoapods_version: request.cocoapods_version.as_deref(),
            fastlane_version: request.fastlane_version.as_deref(),
        },
    );
    {
        let mut runtime = job.runtime.lock().expect("runtime mutex poisoned");
        runtime.versions = versions.clone();
    }

    let env = match setup_build_environment(
        config,
        &home,
        job_id,
        &request.flavor,
        &job.record.branch_name,
        request.fvm_flavor.as_deref(),
        &versions,
    ) {
        Ok(e) => e,
        Err(err) => {
            logger.log(&format!("[{job_id}] failed to set up build environment: {err}"));
            return false;
        }
    };

    mark_stage_running(job, "setup");
    let setup = match run_setup_script(job_id, &cwd, env.vars(), job, logger) {
        Ok(outcome) => outcome,
        Err(err) => {
            logger.log(&format!("[{job_id}] setup script execution failed: {err}"));
            mark_stage_done(job, "setup", None);
            return false;
        }
    };
    mark_stage_done(job, "setup", setup.return_code);
    if !setup.succeeded() {
        logger.log(&format!("[{job_id}] setup failed with code {:?}", setup.return_code));
        return false;
    }

    for name in platform_stage_names(&request.platform) {
        mark_stage_running(job, name);
    }

    let outcomes = match run_build_scripts(
        job_id,
        &request.platform,
        &cwd,
        env.vars(),
        request.build_name.as_deref(),
        request.build_number.as_deref(),
        job,
        logger,
    ) {
        Ok(outcomes) => outcomes,
        Err(err) => {
            logger.log(&format!("[{job_id}] failed to start build scripts: {err}"));
            return false;
        }
    };

    let mut success = true;
    for outcome in &outcomes {
        mark_stage_done(job, &outcome.name, outcome.return_code);
        if outcome.succeeded() {
            logger.log(&format!("[{job_id}] {} completed successfully", outcome.name));
        } else {
            logger.log(&format!("[{job_id}] {} failed with code {:?}", outcome.name, outcome.return_code));
            success = false;
        }
    }
    success && !outcomes.is_empty()
}

fn platform_stage_names(platform: &str) -> Vec<&'static str> {
    match platform {
        "android" => vec!["android"],
        "ios" => vec!["ios"],
        _ => vec!["android", "ios"],
    }
}

fn mark_stage_running(job: &Arc<Job>, stage: &str) {
    let mut runtime = job.runtime.lock().expect("runtime mutex poisoned");
    runtime.stage_status.insert(
        stage.to_string(),
        StageStatus {
            running: true,
            return_code: None,
        },
    );
}

fn mark_stage_done(job: &Arc<Job>, stage: &str, return_code: Option<i32>) {
    let mut runtime = job.runtime.lock().expect("runtime mutex poisoned");
    runtime.stage_status.insert(
        stage.to_string(),
        StageStatus {
            running: false,
            return_code,
        },
    );
}
