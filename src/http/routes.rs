//! Per-endpoint request handlers (spec.md §6). Each returns a JSON body
//! and status code; `mod.rs` owns the `tiny_http` request/response loop.

use std::sync::Arc;

use mbo_protocol::ops::{
    BuildStatusResponse, CleanupResponse, HealthResponse, ListBuildsResponse, ManualBuildRequest,
    ManualBuildResponse, WebhookResponse,
};

use crate::build::{admit, status, AdmissionRequest, BuildSemaphore};
use crate::cleanup::manual_cleanup;
use crate::config::Config;
use crate::job::JobsTable;
use crate::webhook::{handle_webhook, WebhookError};

pub struct JsonResponse {
    pub status: u16,
    pub body: String,
}

fn json<T: serde::Serialize>(status: u16, value: &T) -> JsonResponse {
    JsonResponse {
        status,
        body: serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string()),
    }
}

pub fn health() -> JsonResponse {
    json(200, &HealthResponse::default())
}

pub fn build_status(jobs: &JobsTable, job_id: &str) -> JsonResponse {
    match jobs.get(job_id) {
        Some(job) => {
            let snapshot: BuildStatusResponse = status::snapshot(&job);
            json(200, &snapshot)
        }
        None => {
            let error = mbo_protocol::ApiError::job_not_found(job_id);
            json(404, &error)
        }
    }
}

pub fn list_builds(jobs: &JobsTable) -> JsonResponse {
    let builds = jobs.all().iter().map(|job| status::summary(job)).collect();
    json(200, &ListBuildsResponse { builds })
}

pub fn webhook(
    config: &Config,
    jobs: Arc<JobsTable>,
    semaphore: Arc<BuildSemaphore>,
    payload: &[u8],
    signature_header: Option<&str>,
    event_type: &str,
) -> JsonResponse {
    let config = Arc::new(config.clone());
    let outcome = handle_webhook(&config.github_webhook_secret, payload, signature_header, event_type, {
        let config = Arc::clone(&config);
        move |build_request| {
            admit(
                config,
                jobs,
                semaphore,
                AdmissionRequest {
                    flavor: build_request.flavor,
                    platform: build_request.platform,
                    ..Default::default()
                },
            )
        }
    });

    match outcome {
        Ok(outcome) => match outcome.job_id {
            Some(job_id) => json(200, &WebhookResponse::ok_with_build(job_id)),
            None => json(200, &WebhookResponse::ok_no_build()),
        },
        Err(WebhookError::SignatureMismatch) => {
            json(403, &mbo_protocol::ApiError::new(mbo_protocol::ErrorCode::SignatureMismatch, "signature mismatch"))
        }
        Err(WebhookError::MalformedJson(e)) => json(
            400,
            &mbo_protocol::ApiError::new(mbo_protocol::ErrorCode::InvalidRequest, &e.to_string()),
        ),
    }
}

pub fn manual_build(
    config: &Config,
    jobs: Arc<JobsTable>,
    semaphore: Arc<BuildSemaphore>,
    body: &[u8],
) -> JsonResponse {
    let request: ManualBuildRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) => ManualBuildRequest::default(),
    };
    let request = request.normalized();

    let job_id = admit(
        Arc::new(config.clone()),
        jobs,
        semaphore,
        AdmissionRequest {
            flavor: request.flavor,
            platform: request.platform,
            build_name: request.build_name,
            build_number: request.build_number,
            branch_name: request.branch_name,
            fvm_flavor: request.fvm_flavor,
            flutter_sdk_version: request.flutter_sdk_version,
            gradle_version: request.gradle_version,
            cocoapods_version: request.cocoapods_version,
            fastlane_version: request.fastlane_version,
        },
    );

    json(200, &ManualBuildResponse::new(job_id))
}

pub fn cleanup(config: &Config, jobs: &JobsTable) -> JsonResponse {
    let report = manual_cleanup(&config.builds_dir(), &config.queue_locks_dir(), config.cache_cleanup_days, jobs);
    json(200, &CleanupResponse::new(report.deleted_builds, report.deleted_locks))
}
