//! End-to-end admission: a fake two-stage repo drives a full job from
//! `admit` through to a terminal state, touching workspace assembly,
//! queue locking, stage supervision, and status projection together.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mobile_build_lane::build::{admit, status, AdmissionRequest, BuildSemaphore};
use mobile_build_lane::config::Config;
use mobile_build_lane::job::JobState;
use mobile_build_lane::JobsTable;

static CWD_GUARD: Mutex<()> = Mutex::new(());

fn wait_for_terminal(jobs: &JobsTable, job_id: &str) -> JobState {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let job = jobs.get(job_id).expect("job exists");
        let state = job.runtime.lock().unwrap().state;
        if state.is_terminal() || Instant::now() > deadline {
            return state;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn successful_build_reaches_completed_with_stage_log() {
    let _guard = CWD_GUARD.lock().unwrap();

    let root = tempfile::TempDir::new().unwrap();
    let home = root.path().join("home");
    let workspace_root = root.path().join("workspace");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(root.path().join("action")).unwrap();

    fs::write(
        root.path().join("action/0_setup.sh"),
        "#!/bin/bash\necho 'PROGRESS:setup:Fetching deps:10%'\nexit 0\n",
    )
    .unwrap();
    fs::write(
        root.path().join("action/1_android.sh"),
        "#!/bin/bash\necho 'STEP:build:ok:Android build finished'\nexit 0\n",
    )
    .unwrap();

    let previous_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(root.path()).unwrap();
    std::env::set_var("HOME", &home);

    let config = Arc::new(Config {
        workspace_root,
        github_webhook_secret: b"secret".to_vec(),
        github_token: None,
        repo_url: "https://example.com/app.git".to_string(),
        cache_cleanup_days: 7,
        max_parallel_builds: 3,
        http_port: 0,
    });
    let jobs = Arc::new(JobsTable::new());

    let job_id = admit(
        Arc::clone(&config),
        Arc::clone(&jobs),
        BuildSemaphore::new(3),
        AdmissionRequest {
            flavor: "dev".to_string(),
            platform: "android".to_string(),
            branch_name: Some("develop".to_string()),
            ..Default::default()
        },
    );

    let final_state = wait_for_terminal(&jobs, &job_id);
    std::env::set_current_dir(previous_cwd).unwrap();

    assert_eq!(final_state, JobState::Completed);

    let job = jobs.get(&job_id).unwrap();
    let snapshot = status::snapshot(&job);
    assert!(snapshot.stages.get("setup").unwrap().return_code == Some(0));
    assert!(snapshot.stages.get("android").unwrap().return_code == Some(0));
    assert!(snapshot.logs.iter().any(|l| l.contains("Android build finished")));

    let build_log = fs::read_to_string(config.builds_dir().join(&job_id).join("build.log")).unwrap();
    assert!(build_log.contains("Fetching deps"));
}

#[test]
fn failing_setup_short_circuits_platform_stages() {
    let _guard = CWD_GUARD.lock().unwrap();

    let root = tempfile::TempDir::new().unwrap();
    let home = root.path().join("home");
    let workspace_root = root.path().join("workspace");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(root.path().join("action")).unwrap();

    fs::write(root.path().join("action/0_setup.sh"), "#!/bin/bash\nexit 1\n").unwrap();
    fs::write(root.path().join("action/1_ios.sh"), "#!/bin/bash\nexit 0\n").unwrap();

    let previous_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(root.path()).unwrap();
    std::env::set_var("HOME", &home);

    let config = Arc::new(Config {
        workspace_root,
        github_webhook_secret: b"secret".to_vec(),
        github_token: None,
        repo_url: "https://example.com/app.git".to_string(),
        cache_cleanup_days: 7,
        max_parallel_builds: 3,
        http_port: 0,
    });
    let jobs = Arc::new(JobsTable::new());

    let job_id = admit(
        Arc::clone(&config),
        Arc::clone(&jobs),
        BuildSemaphore::new(3),
        AdmissionRequest {
            flavor: "dev".to_string(),
            platform: "ios".to_string(),
            ..Default::default()
        },
    );

    let final_state = wait_for_terminal(&jobs, &job_id);
    std::env::set_current_dir(previous_cwd).unwrap();

    assert_eq!(final_state, JobState::Failed);
    let job = jobs.get(&job_id).unwrap();
    let snapshot = status::snapshot(&job);
    assert_eq!(snapshot.stages.get("setup").unwrap().return_code, Some(1));
    assert!(!snapshot.stages.contains_key("ios"));
}
