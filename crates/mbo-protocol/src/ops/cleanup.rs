//! Cleanup-trigger operation types (`POST /cleanup`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub status: String,
    pub message: String,
}

impl CleanupResponse {
    pub fn new(deleted_builds: usize, deleted_locks: usize) -> Self {
        Self {
            status: "ok".to_string(),
            message: format!(
                "removed {deleted_builds} aged build(s) and {deleted_locks} orphaned lock(s)"
            ),
        }
    }
}
