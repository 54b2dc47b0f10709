//! Health-check operation types (`GET /`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            message: "\u{1F44B} Flutter CI/CD Container is running!".to_string(),
        }
    }
}
