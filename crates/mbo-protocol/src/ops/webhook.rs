//! Webhook operation types (`POST /webhook`).

use serde::{Deserialize, Serialize};

/// Required headers for a webhook delivery.
pub struct WebhookHeaders<'a> {
    pub signature_256: Option<&'a str>,
    pub event_type: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

impl WebhookResponse {
    pub fn ok_no_build() -> Self {
        Self {
            status: "ok".to_string(),
            build_id: None,
        }
    }

    pub fn ok_with_build(build_id: String) -> Self {
        Self {
            status: "ok".to_string(),
            build_id: Some(build_id),
        }
    }
}
