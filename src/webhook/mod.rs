//! Forge-webhook ingestion: verify, classify, admit.
//!
//! This module is deliberately thin — it owns none of the job-admission
//! logic itself, only the HTTP-adjacent concerns of authenticating the
//! request and deciding whether it names a build at all.

use mbo_classifier::{classify_event, verify_signature, BuildRequest, SignatureError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("signature verification failed")]
    SignatureMismatch,
    #[error("request body is not valid JSON")]
    MalformedJson(#[from] serde_json::Error),
}

impl From<SignatureError> for WebhookError {
    fn from(_: SignatureError) -> Self {
        WebhookError::SignatureMismatch
    }
}

/// Outcome of handling one webhook delivery.
pub struct WebhookOutcome {
    pub build_request: Option<BuildRequest>,
    pub job_id: Option<String>,
}

/// Verify `signature_header` against `payload` using `secret`, parse the
/// body as JSON, classify it, and — if it names a build — hand the
/// resulting [`BuildRequest`] to `admit`.
///
/// `admit` is expected to perform admission (spec.md §4.4.1) and return
/// the newly created `job_id`. Keeping admission out of this module
/// avoids a dependency from the webhook ingestion path back onto the
/// build orchestration path.
pub fn handle_webhook(
    secret: &[u8],
    payload: &[u8],
    signature_header: Option<&str>,
    event_type: &str,
    admit: impl FnOnce(BuildRequest) -> String,
) -> Result<WebhookOutcome, WebhookError> {
    let signature_header = signature_header.unwrap_or("");
    let verified = verify_signature(secret, payload, signature_header)?;
    if !verified {
        return Err(WebhookError::SignatureMismatch);
    }

    let body: serde_json::Value = serde_json::from_slice(payload)?;
    let build_request = classify_event(event_type, &body);

    let job_id = build_request.clone().map(admit);

    Ok(WebhookOutcome {
        build_request,
        job_id,
    })
}
