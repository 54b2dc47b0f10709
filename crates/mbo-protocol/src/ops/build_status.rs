//! Build-status operation types (`GET /build/{id}`).

use crate::job::JobSnapshot;

/// `GET /build/{id}` returns the full `JobSnapshot` directly, or 404.
pub type BuildStatusResponse = JobSnapshot;
