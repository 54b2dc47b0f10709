//! Mobile Build Orchestrator protocol types.
//!
//! Defines the JSON wire types exchanged across the HTTP surface (§6).

pub mod error;
pub mod job;
pub mod ops;

pub use error::{ApiError, ErrorCode};
pub use job::{JobSnapshot, JobState, JobSummary, PlatformProgress, StageStatus, StepRecord};
