//! Subprocess supervision: the setup stage, then parallel android/ios
//! platform stages, each streamed into the job's log with structured
//! progress parsing applied line by line.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use thiserror::Error;

use super::log_file::BuildLogger;
use super::progress::{format_log_entry, parse_progress_line, ParsedLine};
use crate::job::Job;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to spawn {stage}: {source}")]
    SpawnFailed { stage: String, source: std::io::Error },
    #[error("I/O error waiting for {stage}: {source}")]
    Wait { stage: String, source: std::io::Error },
}

/// Outcome of one stage subprocess.
pub struct StageOutcome {
    pub name: String,
    pub return_code: Option<i32>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.return_code, Some(0))
    }
}

fn spawn(
    stage: &str,
    args: &[String],
    cwd: &Path,
    env: &HashMap<String, String>,
) -> Result<Child, StageError> {
    Command::new("bash")
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| StageError::SpawnFailed {
            stage: stage.to_string(),
            source,
        })
}

/// Stream `child`'s combined stdout/stderr into the job's in-memory log
/// tail and on-disk logger, applying structured progress parsing, then
/// wait for it to exit. Lines from stdout and stderr are interleaved in
/// the order each reader thread observes them.
fn stream_and_wait(
    stage: &str,
    platform: &str,
    job_id: &str,
    mut child: Child,
    job: &Arc<Job>,
    logger: &BuildLogger,
) -> Result<Option<i32>, StageError> {
    let (tx, rx) = mpsc::channel::<String>();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_tx = tx.clone();
    let stdout_handle = thread::spawn(move || {
        if let Some(stdout) = stdout {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                let _ = stdout_tx.send(line);
            }
        }
    });

    let stderr_handle = thread::spawn(move || {
        if let Some(stderr) = stderr {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                let _ = tx.send(line);
            }
        }
    });

    for line in rx.iter() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry = format_log_entry(job_id, platform, line);
        logger.log(&entry);

        let mut runtime = job.runtime.lock().expect("runtime mutex poisoned");
        match parse_progress_line(line) {
            ParsedLine::Progress { step, message, percentage } => {
                let progress = runtime.progress_for(platform);
                progress.current_step = step;
                progress.current_message = message;
                progress.percentage = percentage;
            }
            ParsedLine::Step(record) => runtime.record_step(platform, record),
            ParsedLine::Plain => {}
        }
        runtime.push_log(entry);
    }

    stdout_handle.join().ok();
    stderr_handle.join().ok();

    let status = child.wait().map_err(|source| StageError::Wait {
        stage: stage.to_string(),
        source,
    })?;
    Ok(status.code())
}

/// Run `action/0_setup.sh`. Its output is tagged `SETUP` rather than a
/// platform name since it precedes platform fan-out.
pub fn run_setup_script(
    job_id: &str,
    cwd: &Path,
    env: &HashMap<String, String>,
    job: &Arc<Job>,
    logger: &BuildLogger,
) -> Result<StageOutcome, StageError> {
    let child = spawn("setup", &["action/0_setup.sh".to_string()], cwd, env)?;
    let return_code = stream_and_wait("setup", "setup", job_id, child, job, logger)?;
    Ok(StageOutcome {
        name: "setup".to_string(),
        return_code,
    })
}

fn platform_args(script: &str, build_name: Option<&str>, build_number: Option<&str>) -> Vec<String> {
    let mut args = vec![script.to_string()];
    if let Some(name) = build_name {
        args.push("-n".to_string());
        args.push(name.to_string());
    }
    if let Some(number) = build_number {
        args.push("-b".to_string());
        args.push(number.to_string());
    }
    args
}

/// Run the android and/or ios stage scripts named by `platform`
/// (`all|android|ios`) concurrently, waiting for all of them to exit
/// before returning. One [`StageOutcome`] per platform actually started.
pub fn run_build_scripts(
    job_id: &str,
    platform: &str,
    cwd: &Path,
    env: &HashMap<String, String>,
    build_name: Option<&str>,
    build_number: Option<&str>,
    job: &Arc<Job>,
    logger: &Arc<BuildLogger>,
) -> Result<Vec<StageOutcome>, StageError> {
    let mut stage_names = Vec::new();
    if platform == "all" || platform == "android" {
        stage_names.push(("android", "action/1_android.sh"));
    }
    if platform == "all" || platform == "ios" {
        stage_names.push(("ios", "action/1_ios.sh"));
    }

    let mut handles = Vec::new();
    for (name, script) in stage_names {
        let args = platform_args(script, build_name, build_number);
        let child = spawn(name, &args, cwd, env)?;
        let job = Arc::clone(job);
        let logger = Arc::clone(logger);
        let job_id = job_id.to_string();
        let name = name.to_string();
        handles.push(thread::spawn(move || {
            let return_code = stream_and_wait(&name, &name, &job_id, child, &job, &logger);
            (name, return_code)
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        let (name, return_code) = handle.join().expect("stage thread panicked");
        outcomes.push(StageOutcome {
            name,
            return_code: return_code?,
        });
    }
    Ok(outcomes)
}
