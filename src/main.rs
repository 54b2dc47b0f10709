//! mobile-build-lane daemon entry point.

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use mobile_build_lane::build::{admit, AdmissionRequest, BuildSemaphore};
use mobile_build_lane::{cleanup, config::Config, http, JobsTable};

#[derive(Parser)]
#[command(name = "mobile-build-laned")]
#[command(about = "Mobile build-lane CI/CD orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP surface and the daily cleanup scheduler (default).
    Serve,

    /// Run the cleanup sweep once and exit, without starting the server.
    Cleanup,

    /// Trigger a build directly from the command line, bypassing the webhook.
    TriggerBuild {
        #[arg(long, default_value = "dev")]
        flavor: String,

        #[arg(long, default_value = "all")]
        platform: String,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long)]
        fvm_flavor: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(config),
        Commands::Cleanup => run_cleanup_once(&config),
        Commands::TriggerBuild {
            flavor,
            platform,
            branch,
            fvm_flavor,
        } => run_trigger_build(config, flavor, platform, branch, fvm_flavor),
    }
}

fn run_serve(config: Arc<Config>) {
    let jobs = Arc::new(JobsTable::new());

    {
        let config = Arc::clone(&config);
        let jobs = Arc::clone(&jobs);
        std::thread::spawn(move || {
            cleanup::run_scheduler(&config.builds_dir(), &config.queue_locks_dir(), config.cache_cleanup_days, &jobs)
        });
    }

    let semaphore = BuildSemaphore::new(config.max_parallel_builds);
    if let Err(e) = http::serve(config, jobs, semaphore) {
        eprintln!("http server error: {e}");
        process::exit(1);
    }
}

fn run_cleanup_once(config: &Config) {
    let jobs = JobsTable::new();
    let report = cleanup::manual_cleanup(&config.builds_dir(), &config.queue_locks_dir(), config.cache_cleanup_days, &jobs);
    println!(
        "deleted {} build(s) ({} bytes freed), {} orphaned lock(s)",
        report.deleted_builds, report.freed_bytes, report.deleted_locks
    );
}

fn run_trigger_build(
    config: Arc<Config>,
    flavor: String,
    platform: String,
    branch_name: Option<String>,
    fvm_flavor: Option<String>,
) {
    let jobs = Arc::new(JobsTable::new());
    let semaphore = BuildSemaphore::new(config.max_parallel_builds);
    let job_id = admit(
        config,
        Arc::clone(&jobs),
        semaphore,
        AdmissionRequest {
            flavor,
            platform,
            branch_name,
            fvm_flavor,
            ..Default::default()
        },
    );
    println!("admitted {job_id}");

    // Block until the one-off job reaches a terminal state so the
    // process has something to wait on before exiting.
    loop {
        let Some(job) = jobs.get(&job_id) else { break };
        let state = job.runtime.lock().expect("runtime mutex poisoned").state;
        if state.is_terminal() {
            println!("{job_id}: {state:?}");
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(500));
    }
}
