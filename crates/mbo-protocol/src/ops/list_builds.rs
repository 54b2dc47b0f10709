//! List-builds operation types (`GET /builds`).

use crate::job::JobSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBuildsResponse {
    pub builds: Vec<JobSummary>,
}
