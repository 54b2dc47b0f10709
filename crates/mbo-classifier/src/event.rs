//! Deny-by-default classifier for inbound forge webhook events.
//!
//! Only two event shapes ever produce a build request; everything else is
//! acknowledged without scheduling anything.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized build request extracted from a classified webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub flavor: String,
    pub platform: String,
}

impl BuildRequest {
    fn dev_all() -> Self {
        Self {
            flavor: "dev".to_string(),
            platform: "all".to_string(),
        }
    }

    fn prod_all() -> Self {
        Self {
            flavor: "prod".to_string(),
            platform: "all".to_string(),
        }
    }
}

fn tag_version_re() -> Regex {
    Regex::new(r"^\d+\.\d+\.\d+").expect("static regex is valid")
}

/// Classify a webhook event into a build request, or `None` if it should be
/// acknowledged without triggering a build.
pub fn classify_event(event_type: &str, payload: &Value) -> Option<BuildRequest> {
    match event_type {
        "pull_request" => classify_pull_request(payload),
        "create" => classify_tag_create(payload),
        _ => None,
    }
}

fn classify_pull_request(payload: &Value) -> Option<BuildRequest> {
    if payload.get("action").and_then(Value::as_str) != Some("closed") {
        return None;
    }

    let pr = payload.get("pull_request")?;
    if pr.get("merged").and_then(Value::as_bool) != Some(true) {
        return None;
    }

    let base_ref = pr.get("base")?.get("ref")?.as_str()?;
    if base_ref != "develop" {
        return None;
    }

    let head_ref = pr.get("head")?.get("ref")?.as_str()?;
    if !head_ref.starts_with("release-dev-v") {
        return None;
    }

    Some(BuildRequest::dev_all())
}

fn classify_tag_create(payload: &Value) -> Option<BuildRequest> {
    if payload.get("ref_type").and_then(Value::as_str) != Some("tag") {
        return None;
    }

    let tag_name = payload.get("ref").and_then(Value::as_str).unwrap_or("");
    if tag_version_re().is_match(tag_name) {
        Some(BuildRequest::prod_all())
    } else {
        None
    }
}
