//! Resolution of toolchain versions from `fvm_flavors.json` (spec.md
//! §4.4.2). A missing file, missing flavor, or malformed entry all
//! degrade to an empty [`ResolvedVersions`] rather than failing the job.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::job::ResolvedVersions;

#[derive(Debug, Deserialize)]
struct FlavorEntry {
    flutter_version: Option<String>,
    cocoapods_version: Option<String>,
    fastlane_version: Option<String>,
    gradle_version: Option<String>,
}

/// Load `fvm_flavors.json` from `working_dir` and resolve `fvm_flavor`'s
/// entry, if any. Returns `ResolvedVersions::default()` on any failure —
/// this is advisory toolchain pinning, not a build precondition.
pub fn load_fvm_flavor_mapping(working_dir: &Path, fvm_flavor: Option<&str>) -> ResolvedVersions {
    let Some(fvm_flavor) = fvm_flavor else {
        return ResolvedVersions::default();
    };

    let mapping_path = working_dir.join("fvm_flavors.json");
    let contents = match std::fs::read_to_string(&mapping_path) {
        Ok(c) => c,
        Err(_) => return ResolvedVersions::default(),
    };

    let flavor_map: HashMap<String, FlavorEntry> = match serde_json::from_str(&contents) {
        Ok(m) => m,
        Err(_) => return ResolvedVersions::default(),
    };

    match flavor_map.get(fvm_flavor) {
        Some(entry) => ResolvedVersions {
            flutter_version: entry.flutter_version.clone(),
            cocoapods_version: entry.cocoapods_version.clone(),
            fastlane_version: entry.fastlane_version.clone(),
            gradle_version: entry.gradle_version.clone(),
        },
        None => ResolvedVersions::default(),
    }
}

/// Explicit per-tool versions supplied by a caller (the manual-trigger
/// HTTP endpoint, spec.md §6). Any field set here overrides the
/// corresponding entry from `fvm_flavors.json` (spec.md §4.4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionOverrides<'a> {
    pub flutter_sdk_version: Option<&'a str>,
    pub gradle_version: Option<&'a str>,
    pub cocoapods_version: Option<&'a str>,
    pub fastlane_version: Option<&'a str>,
}

/// Apply `overrides` onto `resolved` in place. An override always wins
/// over the FVM-mapped value, whether or not the mapping resolved one.
pub fn apply_overrides(resolved: &mut ResolvedVersions, overrides: VersionOverrides<'_>) {
    if let Some(v) = overrides.flutter_sdk_version {
        resolved.flutter_version = Some(v.to_string());
    }
    if let Some(v) = overrides.gradle_version {
        resolved.gradle_version = Some(v.to_string());
    }
    if let Some(v) = overrides.cocoapods_version {
        resolved.cocoapods_version = Some(v.to_string());
    }
    if let Some(v) = overrides.fastlane_version {
        resolved.fastlane_version = Some(v.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_known_flavor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("fvm_flavors.json"),
            r#"{"prod": {"flutter_version": "3.35.4", "cocoapods_version": "1.14.3"}}"#,
        )
        .unwrap();

        let versions = load_fvm_flavor_mapping(dir.path(), Some("prod"));
        assert_eq!(versions.flutter_version.as_deref(), Some("3.35.4"));
        assert_eq!(versions.cocoapods_version.as_deref(), Some("1.14.3"));
        assert!(versions.gradle_version.is_none());
    }

    #[test]
    fn unknown_flavor_returns_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fvm_flavors.json"), r#"{"prod": {}}"#).unwrap();

        let versions = load_fvm_flavor_mapping(dir.path(), Some("staging"));
        assert!(versions.flutter_version.is_none());
    }

    #[test]
    fn missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let versions = load_fvm_flavor_mapping(dir.path(), Some("prod"));
        assert!(versions.flutter_version.is_none());
    }

    #[test]
    fn no_fvm_flavor_skips_lookup() {
        let dir = TempDir::new().unwrap();
        let versions = load_fvm_flavor_mapping(dir.path(), None);
        assert!(versions.flutter_version.is_none());
    }

    #[test]
    fn explicit_override_wins_over_mapped_value() {
        let mut resolved = ResolvedVersions {
            flutter_version: Some("3.35.4".to_string()),
            ..Default::default()
        };
        apply_overrides(
            &mut resolved,
            VersionOverrides {
                flutter_sdk_version: Some("3.40.0"),
                ..Default::default()
            },
        );
        assert_eq!(resolved.flutter_version.as_deref(), Some("3.40.0"));
    }

    #[test]
    fn override_fills_in_when_mapping_had_nothing() {
        let mut resolved = ResolvedVersions::default();
        apply_overrides(
            &mut resolved,
            VersionOverrides {
                gradle_version: Some("8.10"),
                cocoapods_version: Some("1.14.3"),
                ..Default::default()
            },
        );
        assert_eq!(resolved.gradle_version.as_deref(), Some("8.10"));
        assert_eq!(resolved.cocoapods_version.as_deref(), Some("1.14.3"));
        assert!(resolved.fastlane_version.is_none());
    }
}
