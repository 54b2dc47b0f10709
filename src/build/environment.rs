//! Build-specific environment assembly layered on top of the isolated
//! workspace: version env-vars, repo/branch/flavor identity, Fastlane
//! lane and match-password wiring.

use std::path::Path;

use crate::config::Config;
use crate::job::ResolvedVersions;
use crate::workspace::env::{build_isolated_environment, IsolatedEnvironment};
use crate::workspace::WorkspaceError;

/// The fully assembled environment a stage subprocess inherits, plus the
/// `repo_dir` stages run in.
pub struct StageEnvironment {
    pub isolated: IsolatedEnvironment,
}

impl StageEnvironment {
    pub fn vars(&self) -> &std::collections::HashMap<String, String> {
        &self.isolated.env
    }

    pub fn repo_dir(&self) -> &Path {
        &self.isolated.repo_dir
    }
}

/// Build the stage environment for one job: isolated workspace plus
/// version pins, repo/branch/flavor identity, and Fastlane settings.
pub fn setup_build_environment(
    config: &Config,
    home: &Path,
    job_id: &str,
    flavor: &str,
    branch_name: &str,
    fvm_flavor: Option<&str>,
    versions: &ResolvedVersions,
) -> Result<StageEnvironment, WorkspaceError> {
    let toolchain_versions = crate::workspace::ToolchainVersions {
        flutter_version: versions.flutter_version.clone(),
        gradle_version: versions.gradle_version.clone(),
        cocoapods_version: versions.cocoapods_version.clone(),
    };

    let mut isolated = build_isolated_environment(
        &config.builds_dir(),
        home,
        job_id,
        &toolchain_versions,
        config.github_token.as_deref(),
    )?;

    if let Some(v) = &versions.flutter_version {
        isolated.env.insert("FLUTTER_VERSION".to_string(), v.clone());
    }
    if let Some(v) = &versions.cocoapods_version {
        isolated.env.insert("COCOAPODS_VERSION".to_string(), v.clone());
    }
    if let Some(v) = &versions.fastlane_version {
        isolated.env.insert("FASTLANE_VERSION".to_string(), v.clone());
    }
    if let Some(v) = &versions.gradle_version {
        isolated.env.insert("GRADLE_VERSION".to_string(), v.clone());
    }

    isolated.env.insert("REPO_URL".to_string(), config.repo_url.clone());
    isolated.env.insert(
        "LOCAL_DIR".to_string(),
        isolated.repo_dir.display().to_string(),
    );
    isolated.env.insert("BRANCH_NAME".to_string(), branch_name.to_string());
    isolated.env.insert("FLAVOR".to_string(), flavor.to_string());
    isolated
        .env
        .insert("FASTLANE_LANE".to_string(), crate::config::fastlane_lane_for(flavor));

    if let Some(fvm_flavor) = fvm_flavor {
        isolated.env.insert("FVM_FLAVOR".to_string(), fvm_flavor.to_string());
    }

    if let Ok(match_password) = std::env::var("MATCH_PASSWORD") {
        isolated.env.insert("MATCH_PASSWORD".to_string(), match_password);
    }

    Ok(StageEnvironment { isolated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(workspace_root: &Path) -> Config {
        Config {
            workspace_root: workspace_root.to_path_buf(),
            github_webhook_secret: b"secret".to_vec(),
            github_token: None,
            repo_url: "https://example.com/repo.git".to_string(),
            cache_cleanup_days: 7,
            max_parallel_builds: 3,
            http_port: 8080,
        }
    }

    #[test]
    fn assembles_identity_and_version_vars() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let home = root.path().join("home");
        std::fs::create_dir_all(&home).unwrap();

        let versions = ResolvedVersions {
            flutter_version: Some("3.35.4".to_string()),
            ..Default::default()
        };

        let env = setup_build_environment(
            &config,
            &home,
            "dev-all-20260101-000000",
            "dev",
            "develop",
            Some("prod"),
            &versions,
        )
        .unwrap();

        assert_eq!(env.vars()["FLAVOR"], "dev");
        assert_eq!(env.vars()["BRANCH_NAME"], "develop");
        assert_eq!(env.vars()["FASTLANE_LANE"], "beta");
        assert_eq!(env.vars()["FVM_FLAVOR"], "prod");
        assert_eq!(env.vars()["FLUTTER_VERSION"], "3.35.4");
    }
}
