//! Assembly of the fully isolated per-job environment: directory
//! creation/linking plus the env-var table each stage subprocess inherits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{
    build_workspace, create_symlink_or_directory, git, version_cache_dirs, SharedCaches,
    ToolchainVersions, WorkspaceError,
};

/// Resolved filesystem layout and environment for one job.
pub struct IsolatedEnvironment {
    pub repo_dir: PathBuf,
    pub pub_cache_dir: PathBuf,
    pub gradle_home_dir: PathBuf,
    pub gem_home_dir: PathBuf,
    pub cocoapods_cache_dir: PathBuf,
    pub deriveddata_cache_dir: PathBuf,
    pub env: HashMap<String, String>,
}

/// Build the isolated workspace and environment for `job_id` under
/// `builds_dir`, linking in shared caches for whichever `versions` are
/// known and falling back to private empty directories otherwise.
pub fn build_isolated_environment(
    builds_dir: &Path,
    home: &Path,
    job_id: &str,
    versions: &ToolchainVersions,
    github_token: Option<&str>,
) -> Result<IsolatedEnvironment, WorkspaceError> {
    let workspace = build_workspace(builds_dir, job_id);
    let repo_dir = workspace.join("repo");
    std::fs::create_dir_all(&repo_dir)?;

    let pub_cache_dir = workspace.join("pub_cache");
    let gradle_home_dir = workspace.join("gradle_home");
    let gem_home_dir = workspace.join("gem_home");
    let cocoapods_cache_dir = workspace.join("cocoapods_cache");
    let deriveddata_cache_dir = workspace.join("deriveddata_cache");

    let shared: SharedCaches = version_cache_dirs(home, versions)?;

    create_symlink_or_directory(&pub_cache_dir, shared.pub_cache.as_deref())?;
    create_symlink_or_directory(&gradle_home_dir, shared.gradle_cache.as_deref())?;
    create_symlink_or_directory(&gem_home_dir, shared.gem_cache.as_deref())?;
    create_symlink_or_directory(&cocoapods_cache_dir, shared.cocoapods_cache.as_deref())?;
    create_symlink_or_directory(&deriveddata_cache_dir, shared.deriveddata_cache.as_deref())?;

    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.insert("PUB_CACHE".to_string(), pub_cache_dir.display().to_string());
    env.insert("GRADLE_USER_HOME".to_string(), gradle_home_dir.display().to_string());
    env.insert("GEM_HOME".to_string(), gem_home_dir.display().to_string());
    env.insert("GEM_PATH".to_string(), gem_home_dir.display().to_string());
    env.insert("CP_HOME_DIR".to_string(), cocoapods_cache_dir.display().to_string());
    env.insert("DERIVED_DATA_PATH".to_string(), deriveddata_cache_dir.display().to_string());

    let existing_path = env.get("PATH").cloned().unwrap_or_else(|| "/usr/local/bin:/usr/bin:/bin".to_string());
    env.insert(
        "PATH".to_string(),
        format!(
            "{}:{}:{}",
            gem_home_dir.join("bin").display(),
            pub_cache_dir.join("bin").display(),
            existing_path
        ),
    );
    env.insert("HOME".to_string(), home.display().to_string());

    git::setup_git_credentials(&workspace, home, github_token, &mut env)
        .map_err(|e| WorkspaceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    let uses_shared_cache =
        versions.flutter_version.is_some() || versions.gradle_version.is_some() || versions.cocoapods_version.is_some();
    let git_link_result = if uses_shared_cache {
        git::link_shared_git_cache(&pub_cache_dir, &shared.git_cache)
    } else {
        git::link_user_git_cache(&pub_cache_dir, home)
    };
    git_link_result.map_err(|e| WorkspaceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    Ok(IsolatedEnvironment {
        repo_dir,
        pub_cache_dir,
        gradle_home_dir,
        gem_home_dir,
        cocoapods_cache_dir,
        deriveddata_cache_dir,
        env,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn assembles_expected_env_vars() {
        let root = TempDir::new().unwrap();
        let builds_dir = root.path().join("builds");
        let home = root.path().join("home");
        std::fs::create_dir_all(&home).unwrap();

        let versions = ToolchainVersions {
            flutter_version: Some("3.35.4".into()),
            gradle_version: Some("8.10".into()),
            cocoapods_version: Some("1.14.3".into()),
        };

        let resolved = build_isolated_environment(&builds_dir, &home, "dev-all-20260101-000000", &versions, None).unwrap();

        assert_eq!(resolved.env["PUB_CACHE"], resolved.pub_cache_dir.display().to_string());
        assert_eq!(resolved.env["GEM_PATH"], resolved.env["GEM_HOME"]);
        assert!(resolved.env["PATH"].contains("pub_cache/bin"));
        assert!(resolved.pub_cache_dir.is_symlink());
    }

    #[test]
    fn missing_versions_produce_private_directories() {
        let root = TempDir::new().unwrap();
        let builds_dir = root.path().join("builds");
        let home = root.path().join("home");
        std::fs::create_dir_all(&home).unwrap();

        let versions = ToolchainVersions::default();
        let resolved = build_isolated_environment(&builds_dir, &home, "dev-all-x", &versions, None).unwrap();

        assert!(resolved.pub_cache_dir.is_dir());
        assert!(!resolved.pub_cache_dir.is_symlink());
    }

    #[test]
    fn missing_versions_still_warm_git_cache_from_users_pub_cache() {
        let root = TempDir::new().unwrap();
        let builds_dir = root.path().join("builds");
        let home = root.path().join("home");
        std::fs::create_dir_all(&home).unwrap();

        let versions = ToolchainVersions::default();
        let resolved = build_isolated_environment(&builds_dir, &home, "dev-all-x", &versions, None).unwrap();

        let git_link = resolved.pub_cache_dir.join("git");
        assert!(git_link.is_symlink());
        assert_eq!(std::fs::read_link(&git_link).unwrap(), home.join(".pub-cache").join("git"));
    }
}
