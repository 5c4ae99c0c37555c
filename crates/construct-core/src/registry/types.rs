//! Registry payload types
//!
//! Wire shapes are camelCase JSON. Deserialization is the boundary
//! validation: payloads that do not fit these shapes are rejected before
//! they reach the lifecycle orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::license::{License, Tier};

/// Package metadata from `GET /skills/{slug}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub latest_version: String,
    pub tier_required: Tier,
    #[serde(default)]
    pub category: Option<String>,
}

/// One file shipped in a download payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFile {
    pub path: String,
    pub content: String,
}

/// The skill portion of a download payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillPayload {
    pub name: String,
    pub version: String,
    pub files: Vec<PackageFile>,
}

/// Response of `GET /skills/{slug}/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPayload {
    pub skill: SkillPayload,
    pub license: License,
    #[serde(default)]
    pub cache_ttl: Option<u64>,
}

impl DownloadPayload {
    /// Structural checks beyond what serde enforces. Run on receipt.
    pub fn validate_shape(&self, slug: &str) -> Result<(), RegistryError> {
        if self.skill.version.trim().is_empty() {
            return Err(RegistryError::InvalidPayload(format!(
                "download for '{}' has an empty version",
                slug
            )));
        }
        if self.skill.files.is_empty() {
            return Err(RegistryError::InvalidPayload(format!(
                "download for '{}' contains no files",
                slug
            )));
        }
        for file in &self.skill.files {
            let path = std::path::Path::new(&file.path);
            if path.is_absolute()
                || path
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(RegistryError::InvalidPayload(format!(
                    "download for '{}' contains unsafe file path '{}'",
                    slug, file.path
                )));
            }
        }
        Ok(())
    }
}

/// Response of `GET /public-keys/{keyId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    pub key_id: String,
    pub algorithm: String,
    pub public_key_pem: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Optional filters for registry search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub tier: Option<Tier>,
}

/// Best-effort telemetry for `POST /install-events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallEvent {
    pub slug: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
}

/// Best-effort telemetry for `POST /uninstall-events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallEvent {
    pub slug: String,
    pub uninstalled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseType;

    fn payload(files: Vec<PackageFile>) -> DownloadPayload {
        DownloadPayload {
            skill: SkillPayload {
                name: "Reviewer".to_string(),
                version: "1.0.0".to_string(),
                files,
            },
            license: License {
                license_type: LicenseType::Free,
                tier: Tier::Free,
                expires_at: None,
                watermark: "u-w".to_string(),
                signature: "sig".to_string(),
                key_id: "k1".to_string(),
            },
            cache_ttl: None,
        }
    }

    #[test]
    fn parses_camel_case_wire_payload() {
        let json = r#"{
            "slug": "acme/reviewer",
            "name": "Reviewer",
            "latestVersion": "2.1.0",
            "tierRequired": "team"
        }"#;
        let meta: PackageMetadata = serde_json::from_str(json).expect("parses");
        assert_eq!(meta.latest_version, "2.1.0");
        assert_eq!(meta.tier_required, Tier::Team);
    }

    #[test]
    fn rejects_empty_file_list() {
        let err = payload(vec![]).validate_shape("pkg").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPayload(_)));
    }

    #[test]
    fn rejects_path_traversal_in_files() {
        let files = vec![PackageFile {
            path: "../outside.md".to_string(),
            content: String::new(),
        }];
        let err = payload(files).validate_shape("pkg").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPayload(_)));
    }

    #[test]
    fn accepts_nested_relative_paths() {
        let files = vec![PackageFile {
            path: "docs/guide.md".to_string(),
            content: "hi".to_string(),
        }];
        payload(files).validate_shape("pkg").expect("valid shape");
    }
}
