//! Thread-safe append-only `build.log` file for one job.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

pub struct BuildLogger {
    log_file_path: PathBuf,
    file: Mutex<File>,
}

impl BuildLogger {
    /// Create `<build_workspace>/build.log`, writing a header that
    /// records the job id and start time.
    pub fn create(build_workspace: &Path, job_id: &str) -> io::Result<Self> {
        fs::create_dir_all(build_workspace)?;
        let log_file_path = build_workspace.join("build.log");

        let mut file = File::create(&log_file_path)?;
        writeln!(file, "=== Build Log for {job_id} ===")?;
        writeln!(file, "Started at: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file, "{}", "=".repeat(50))?;
        writeln!(file)?;

        let file = OpenOptions::new().append(true).open(&log_file_path)?;
        Ok(Self {
            log_file_path,
            file: Mutex::new(file),
        })
    }

    /// Append one line, flushing immediately so `tail -f` sees it live.
    pub fn log(&self, message: &str) {
        let mut file = self.file.lock().expect("build log mutex poisoned");
        if let Err(e) = writeln!(file, "{message}") {
            eprintln!("[build] failed to write to {}: {e}", self.log_file_path.display());
            return;
        }
        let _ = file.flush();
    }

    pub fn path(&self) -> &Path {
        &self.log_file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_header_and_appends_lines() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("dev-all-x");
        let logger = BuildLogger::create(&workspace, "dev-all-x").unwrap();

        logger.log("[dev-all-x] hello");
        logger.log("[dev-all-x] world");

        let contents = fs::read_to_string(logger.path()).unwrap();
        assert!(contents.contains("=== Build Log for dev-all-x ==="));
        assert!(contents.contains("hello"));
        assert!(contents.contains("world"));
    }
}
