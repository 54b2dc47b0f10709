//! Git credential setup for stage subprocesses: HTTPS via `GITHUB_TOKEN`
//! when present, otherwise SSH using the invoking user's agent/config.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitSetupError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

const SSH_KEY_RESTRICTIVE_PERMS: u32 = 0o077;

/// Populate `env` with git credentials for `build_workspace`. Mutates
/// `env["HOME"]` if unset, and either writes per-job `.git-credentials`
/// / `.gitconfig` files (HTTPS, when `github_token` is `Some`) or wires
/// up `SSH_AUTH_SOCK`/`GIT_SSH_COMMAND` and copies the caller's
/// `~/.gitconfig` (SSH, otherwise).
pub fn setup_git_credentials(
    build_workspace: &Path,
    home: &Path,
    github_token: Option<&str>,
    env: &mut HashMap<String, String>,
) -> Result<(), GitSetupError> {
    env.entry("HOME".to_string())
        .or_insert_with(|| home.display().to_string());

    if let Some(token) = github_token {
        let credentials_path = build_workspace.join(".git-credentials");
        fs::write(&credentials_path, format!("https://{token}@github.com\n"))?;
        set_owner_only_perms(&credentials_path)?;

        let gitconfig_path = build_workspace.join(".gitconfig");
        fs::write(
            &gitconfig_path,
            format!("[credential]\n    helper = store --file={}\n", credentials_path.display()),
        )?;

        env.insert("GIT_CONFIG_GLOBAL".to_string(), gitconfig_path.display().to_string());
        return Ok(());
    }

    if let Ok(sock) = std::env::var("SSH_AUTH_SOCK") {
        env.insert("SSH_AUTH_SOCK".to_string(), sock);
    }

    let ssh_config = home.join(".ssh").join("config");
    if ssh_config.exists() {
        env.insert(
            "GIT_SSH_COMMAND".to_string(),
            format!("ssh -F {} -o StrictHostKeyChecking=no", ssh_config.display()),
        );
    } else {
        env.insert(
            "GIT_SSH_COMMAND".to_string(),
            "ssh -o StrictHostKeyChecking=no".to_string(),
        );
    }

    let gitconfig_src = home.join(".gitconfig");
    if gitconfig_src.exists() {
        let gitconfig_dest = build_workspace.join(".gitconfig");
        fs::copy(&gitconfig_src, &gitconfig_dest)?;
        env.insert("GIT_CONFIG_GLOBAL".to_string(), gitconfig_dest.display().to_string());
    }

    warn_if_ssh_key_too_open(&home.join(".ssh").join("id_rsa"));

    Ok(())
}

#[cfg(unix)]
fn set_owner_only_perms(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_perms(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn warn_if_ssh_key_too_open(ssh_key: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(ssh_key) {
        if meta.permissions().mode() & SSH_KEY_RESTRICTIVE_PERMS != 0 {
            eprintln!("[workspace] WARNING: SSH key has too open permissions: {}", ssh_key.display());
        }
    }
}

#[cfg(not(unix))]
fn warn_if_ssh_key_too_open(_ssh_key: &Path) {}

fn link_git_cache(pub_cache_dir: &Path, source: &Path) -> Result<(), GitSetupError> {
    let target = pub_cache_dir.join("git");
    if target.exists() || target.is_symlink() {
        return Ok(());
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(source, &target)?;
    #[cfg(not(unix))]
    fs::create_dir_all(&target)?;
    Ok(())
}

/// Symlink the shared, version-independent git-dependency cache into a
/// job's `pub_cache/git`, if not already linked.
pub fn link_shared_git_cache(pub_cache_dir: &Path, shared_git_cache: &Path) -> Result<(), GitSetupError> {
    link_git_cache(pub_cache_dir, shared_git_cache)
}

/// Symlink the invoking user's own `~/.pub-cache/git` into a job's
/// `pub_cache/git`. Used when no toolchain version was supplied, so
/// there's no version-keyed shared cache to warm git dependencies from
/// (spec.md §4.4.3; `original_source/src/core/config.py`'s
/// `use_shared_cache` gate).
pub fn link_user_git_cache(pub_cache_dir: &Path, home: &Path) -> Result<(), GitSetupError> {
    link_git_cache(pub_cache_dir, &home.join(".pub-cache").join("git"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn https_mode_writes_credentials_when_token_present() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("job");
        fs::create_dir_all(&workspace).unwrap();
        let mut env = HashMap::new();

        setup_git_credentials(&workspace, dir.path(), Some("ghp_abc123"), &mut env).unwrap();

        let creds = fs::read_to_string(workspace.join(".git-credentials")).unwrap();
        assert!(creds.contains("ghp_abc123"));
        assert!(env.contains_key("GIT_CONFIG_GLOBAL"));
        assert!(!env.contains_key("SSH_AUTH_SOCK"));
    }

    #[test]
    fn ssh_mode_sets_ssh_command_without_token() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("job");
        fs::create_dir_all(&workspace).unwrap();
        let mut env = HashMap::new();

        setup_git_credentials(&workspace, dir.path(), None, &mut env).unwrap();

        assert!(env.get("GIT_SSH_COMMAND").unwrap().contains("StrictHostKeyChecking=no"));
        assert!(!workspace.join(".git-credentials").exists());
    }

    #[test]
    fn link_shared_git_cache_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let pub_cache = dir.path().join("pub_cache");
        fs::create_dir_all(&pub_cache).unwrap();
        let shared = dir.path().join("shared_git");
        fs::create_dir_all(&shared).unwrap();

        link_shared_git_cache(&pub_cache, &shared).unwrap();
        link_shared_git_cache(&pub_cache, &shared).unwrap();
        assert!(pub_cache.join("git").is_symlink());
    }

    #[test]
    fn link_user_git_cache_points_at_home_pub_cache() {
        let dir = TempDir::new().unwrap();
        let pub_cache = dir.path().join("pub_cache");
        fs::create_dir_all(&pub_cache).unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(home.join(".pub-cache").join("git")).unwrap();

        link_user_git_cache(&pub_cache, &home).unwrap();

        let link = pub_cache.join("git");
        assert!(link.is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), home.join(".pub-cache").join("git"));
    }
}
