//! Process-wide configuration, loaded once from the environment at startup.
//!
//! There is exactly one configuration source here (the process
//! environment); unlike the host/repo/CLI layering a multi-surface lane
//! would need, a single daemon process reads its knobs once at boot.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable GITHUB_WEBHOOK_SECRET is not set")]
    MissingWebhookSecret,
    #[error("could not resolve home directory")]
    NoHomeDir,
}

/// Effective process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the per-job workspace tree. Default `~/ci-cd-workspace`.
    pub workspace_root: PathBuf,
    /// HMAC secret used to verify `X-Hub-Signature-256`. Required.
    pub github_webhook_secret: Vec<u8>,
    /// `GITHUB_TOKEN`, if set, selects HTTPS git credentials over SSH.
    pub github_token: Option<String>,
    /// Upstream repository URL injected into the stage environment.
    pub repo_url: String,
    /// Days a build directory survives before the cleanup sweep deletes it.
    pub cache_cleanup_days: u64,
    /// Admission-side cap on concurrently running jobs.
    pub max_parallel_builds: usize,
    /// TCP port the HTTP surface listens on.
    pub http_port: u16,
}

impl Config {
    /// Build a `Config` from the process environment.
    ///
    /// `GITHUB_WEBHOOK_SECRET` must be set; every other variable has a
    /// documented default (see spec.md §6, "Environment variables consumed").
    pub fn from_env() -> Result<Self, ConfigError> {
        let github_webhook_secret = std::env::var("GITHUB_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingWebhookSecret)?
            .into_bytes();

        let workspace_root = match std::env::var("WORKSPACE_ROOT") {
            Ok(v) => PathBuf::from(v),
            Err(_) => home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join("ci-cd-workspace"),
        };

        let cache_cleanup_days = std::env::var("CACHE_CLEANUP_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);

        let max_parallel_builds = std::env::var("MAX_PARALLEL_BUILDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let http_port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            workspace_root,
            github_webhook_secret,
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            repo_url: std::env::var("REPO_URL").unwrap_or_default(),
            cache_cleanup_days,
            max_parallel_builds,
            http_port,
        })
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.workspace_root.join("builds")
    }

    pub fn queue_locks_dir(&self) -> PathBuf {
        self.workspace_root.join("queue_locks")
    }
}

/// `$HOME`, resolved the same way the rest of the orchestrator resolves it
/// (used both here and for shared-cache placement under
/// `~/ci-cd-workspace/shared`).
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Per-flavor branch-name fallback: `<FLAVOR>_BRANCH_NAME`, else `develop`.
pub fn branch_env_fallback(flavor: &str) -> String {
    let key = format!("{}_BRANCH_NAME", flavor.to_uppercase());
    std::env::var(key).unwrap_or_else(|_| "develop".to_string())
}

/// Per-flavor Fastlane lane: `<FLAVOR>_FASTLANE_LANE`, else `beta`.
pub fn fastlane_lane_for(flavor: &str) -> String {
    let key = format!("{}_FASTLANE_LANE", flavor.to_uppercase());
    std::env::var(key).unwrap_or_else(|_| "beta".to_string())
}
