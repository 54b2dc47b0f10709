//! Manual build-trigger operation types (`POST /build`).

use serde::{Deserialize, Serialize};

fn default_flavor() -> String {
    "dev".to_string()
}

fn default_platform() -> String {
    "all".to_string()
}

/// Request body for a manually triggered build.
///
/// Empty-string fields are normalized to `None` by [`ManualBuildRequest::normalized`]
/// before being handed to the Build Service, matching the forgiving-form-post
/// behavior of the original HTTP edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualBuildRequest {
    #[serde(default = "default_flavor")]
    pub flavor: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub build_name: Option<String>,
    #[serde(default)]
    pub build_number: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub fvm_flavor: Option<String>,
    #[serde(default)]
    pub flutter_sdk_version: Option<String>,
    #[serde(default)]
    pub gradle_version: Option<String>,
    #[serde(default)]
    pub cocoapods_version: Option<String>,
    #[serde(default)]
    pub fastlane_version: Option<String>,
}

impl Default for ManualBuildRequest {
    fn default() -> Self {
        Self {
            flavor: default_flavor(),
            platform: default_platform(),
            build_name: None,
            build_number: None,
            branch_name: None,
            fvm_flavor: None,
            flutter_sdk_version: None,
            gradle_version: None,
            cocoapods_version: None,
            fastlane_version: None,
        }
    }
}

impl ManualBuildRequest {
    /// Collapse empty-string optionals to `None`.
    pub fn normalized(mut self) -> Self {
        fn clear_if_empty(field: &mut Option<String>) {
            if field.as_deref() == Some("") {
                *field = None;
            }
        }
        clear_if_empty(&mut self.build_name);
        clear_if_empty(&mut self.build_number);
        clear_if_empty(&mut self.branch_name);
        clear_if_empty(&mut self.fvm_flavor);
        clear_if_empty(&mut self.flutter_sdk_version);
        clear_if_empty(&mut self.gradle_version);
        clear_if_empty(&mut self.cocoapods_version);
        clear_if_empty(&mut self.fastlane_version);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualBuildResponse {
    pub status: String,
    pub build_id: String,
}

impl ManualBuildResponse {
    pub fn new(build_id: String) -> Self {
        Self {
            status: "manual trigger ok".to_string(),
            build_id,
        }
    }
}
