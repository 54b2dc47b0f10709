//! Per-job workspace layout, version-keyed shared caches, and the
//! isolated environment each stage subprocess runs under.

pub mod env;
pub mod git;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::queue::lock::{FileLock, LockError};

/// How long a job will wait for another job to finish first-creating a
/// shared-cache directory before giving up.
const CACHE_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not resolve home directory")]
    NoHomeDir,
    #[error("cache directory lock error: {0}")]
    Lock(#[from] LockError),
}

/// `<workspace_root>/builds/<job_id>/`.
pub fn build_workspace(builds_dir: &Path, job_id: &str) -> PathBuf {
    builds_dir.join(job_id)
}

/// `<home>/ci-cd-workspace/shared/`, created on first use.
pub fn shared_cache_root(home: &Path) -> Result<PathBuf, WorkspaceError> {
    let shared = home.join("ci-cd-workspace").join("shared");
    fs::create_dir_all(&shared)?;
    Ok(shared)
}

/// Versions that select which shared caches a job links into.
#[derive(Debug, Clone, Default)]
pub struct ToolchainVersions {
    pub flutter_version: Option<String>,
    pub gradle_version: Option<String>,
    pub cocoapods_version: Option<String>,
}

/// Resolved shared-cache directories, created as needed. `deriveddata`
/// and `gem`/`cocoapods` caches are keyed by `cocoapods_version`, not a
/// separate deriveddata version — the original couples Xcode DerivedData
/// reuse to the CocoaPods toolchain that produced it.
#[derive(Debug, Clone, Default)]
pub struct SharedCaches {
    pub pub_cache: Option<PathBuf>,
    pub git_cache: PathBuf,
    pub gradle_cache: Option<PathBuf>,
    pub gem_cache: Option<PathBuf>,
    pub cocoapods_cache: Option<PathBuf>,
    pub deriveddata_cache: Option<PathBuf>,
}

/// Create `path` (a shared-cache directory under `shared_root`) if it
/// doesn't already exist, guarding the first creation with an exclusive
/// file lock so two jobs racing to warm the same version-keyed cache
/// don't stomp on each other's partially-created directory.
fn ensure_dir(shared_root: &Path, path: &Path) -> Result<PathBuf, WorkspaceError> {
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let lock_name = path
        .strip_prefix(shared_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace(['/', '\\'], "_");
    let lock_path = shared_root.join(".locks").join(format!("{lock_name}.lock"));
    let _lock = FileLock::acquire(&lock_path, CACHE_LOCK_TIMEOUT)?;

    fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// Materialize the version-keyed shared-cache directories named by
/// `versions`. The `pub/git` cache is global and always created.
pub fn version_cache_dirs(
    home: &Path,
    versions: &ToolchainVersions,
) -> Result<SharedCaches, WorkspaceError> {
    let shared = shared_cache_root(home)?;

    let pub_cache = match &versions.flutter_version {
        Some(v) => Some(ensure_dir(&shared, &shared.join("pub").join(v))?),
        None => None,
    };
    let git_cache = ensure_dir(&shared, &shared.join("pub").join("git"))?;

    let gradle_cache = match &versions.gradle_version {
        Some(v) => Some(ensure_dir(&shared, &shared.join("gradle").join(v))?),
        None => None,
    };

    let (gem_cache, cocoapods_cache, deriveddata_cache) = match &versions.cocoapods_version {
        Some(v) => (
            Some(ensure_dir(&shared, &shared.join("gems").join(format!("cocoapods-{v}")))?),
            Some(ensure_dir(&shared, &shared.join("cocoapods").join(v))?),
            Some(ensure_dir(&shared, &shared.join("deriveddata").join(v))?),
        ),
        None => (None, None, None),
    };

    Ok(SharedCaches {
        pub_cache,
        git_cache,
        gradle_cache,
        gem_cache,
        cocoapods_cache,
        deriveddata_cache,
    })
}

/// Remove whatever currently occupies `target` (symlink or directory),
/// then recreate it as a symlink to `source` (if given) or as a private
/// empty directory. Idempotent: safe to call against a path that
/// already has the desired shape.
pub fn create_symlink_or_directory(
    target: &Path,
    source: Option<&Path>,
) -> Result<(), WorkspaceError> {
    if target.is_symlink() {
        fs::remove_file(target)?;
    } else if target.is_dir() {
        fs::remove_dir_all(target)?;
    } else if target.exists() {
        fs::remove_file(target)?;
    }

    match source {
        Some(src) => {
            #[cfg(unix)]
            std::os::unix::fs::symlink(src, target)?;
            #[cfg(not(unix))]
            fs::create_dir_all(target)?;
        }
        None => fs::create_dir_all(target)?,
    }
    Ok(())
}

/// The five per-job cache subdirectory names, in their env-var order.
pub const CACHE_SUBDIRS: [&str; 5] = [
    "pub_cache",
    "gradle_home",
    "gem_home",
    "cocoapods_cache",
    "deriveddata_cache",
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn version_cache_dirs_only_creates_whats_known() {
        let home = TempDir::new().unwrap();
        let versions = ToolchainVersions {
            flutter_version: Some("3.35.4".into()),
            gradle_version: None,
            cocoapods_version: None,
        };
        let caches = version_cache_dirs(home.path(), &versions).unwrap();
        assert!(caches.pub_cache.unwrap().ends_with("pub/3.35.4"));
        assert!(caches.gradle_cache.is_none());
        assert!(caches.git_cache.ends_with("pub/git"));
    }

    #[test]
    fn cocoapods_version_keys_deriveddata_and_gems() {
        let home = TempDir::new().unwrap();
        let versions = ToolchainVersions {
            flutter_version: None,
            gradle_version: None,
            cocoapods_version: Some("1.14.3".into()),
        };
        let caches = version_cache_dirs(home.path(), &versions).unwrap();
        assert!(caches.deriveddata_cache.unwrap().ends_with("deriveddata/1.14.3"));
        assert!(caches.gem_cache.unwrap().ends_with("gems/cocoapods-1.14.3"));
    }

    #[test]
    fn symlink_or_directory_replaces_existing_directory_with_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pub_cache");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), b"x").unwrap();

        let source = dir.path().join("shared").join("pub").join("3.35.4");
        fs::create_dir_all(&source).unwrap();

        create_symlink_or_directory(&target, Some(&source)).unwrap();
        assert!(target.is_symlink());
        assert!(!target.join("stale.txt").exists());
    }

    #[test]
    fn symlink_or_directory_creates_private_dir_without_source() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pub_cache");
        create_symlink_or_directory(&target, None).unwrap();
        assert!(target.is_dir());
        assert!(!target.is_symlink());
    }

    #[test]
    fn concurrent_first_creation_of_same_cache_dir_is_safe() {
        use std::sync::Arc;
        use std::thread;

        let home = TempDir::new().unwrap();
        let home_path = Arc::new(home.path().to_path_buf());
        let versions = Arc::new(ToolchainVersions {
            flutter_version: Some("3.35.4".into()),
            gradle_version: None,
            cocoapods_version: None,
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let home_path = Arc::clone(&home_path);
            let versions = Arc::clone(&versions);
            handles.push(thread::spawn(move || version_cache_dirs(&home_path, &versions).unwrap()));
        }

        for h in handles {
            let caches = h.join().unwrap();
            assert!(caches.pub_cache.unwrap().ends_with("pub/3.35.4"));
        }
    }

    #[test]
    fn removing_job_workspace_does_not_touch_symlink_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("shared").join("pub").join("3.35.4");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("keep.txt"), b"keep").unwrap();

        let workspace = dir.path().join("builds").join("dev-all-x");
        fs::create_dir_all(&workspace).unwrap();
        let link = workspace.join("pub_cache");
        create_symlink_or_directory(&link, Some(&source)).unwrap();

        fs::remove_dir_all(&workspace).unwrap();
        assert!(source.join("keep.txt").exists());
    }
}
