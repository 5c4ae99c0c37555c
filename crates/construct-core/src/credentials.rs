//! Per-registry credential and registry config storage
//!
//! Both stores are JSON files under an explicitly injected path. A stored
//! credential is a presence fact only; whether it is still valid is decided
//! by the registry on next use.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::license::Tier;

/// A named remote registry endpoint. Created by user configuration,
/// read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub is_default: bool,
}

/// One credential per registry name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey {
        key: String,
        user_id: String,
        tier: Tier,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "oauth")]
    OAuth {
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
        user_id: String,
        tier: Tier,
    },
}

impl Credential {
    pub fn tier(&self) -> Tier {
        match self {
            Credential::ApiKey { tier, .. } | Credential::OAuth { tier, .. } => *tier,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Credential::ApiKey { user_id, .. } | Credential::OAuth { user_id, .. } => user_id,
        }
    }

    /// Token sent as the bearer credential on registry requests.
    pub fn auth_token(&self) -> &str {
        match self {
            Credential::ApiKey { key, .. } => key,
            Credential::OAuth { access_token, .. } => access_token,
        }
    }
}

/// Credential storage indexed by registry name.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, Credential>,
}

impl CredentialStore {
    /// Load credentials from a specific path. A missing file is an empty
    /// store.
    pub fn load(path: &Path) -> Result<Self> {
        let credentials = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            credentials,
        })
    }

    /// Persist the store to its path.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.credentials)?;
        fs::write(&self.path, contents)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = fs::metadata(&self.path) {
                let mut permissions = metadata.permissions();
                permissions.set_mode(0o600);
                let _ = fs::set_permissions(&self.path, permissions);
            }
        }
        Ok(())
    }

    pub fn get(&self, registry_name: &str) -> Option<&Credential> {
        self.credentials.get(registry_name)
    }

    pub fn set(&mut self, registry_name: &str, credential: Credential) {
        self.credentials
            .insert(registry_name.to_string(), credential);
    }

    pub fn remove(&mut self, registry_name: &str) -> bool {
        self.credentials.remove(registry_name).is_some()
    }

    /// Pure presence check; does not validate the credential.
    pub fn is_authenticated(&self, registry_name: &str) -> bool {
        self.credentials.contains_key(registry_name)
    }

    /// Get the credential for a registry or the auth-required error.
    pub fn require(&self, registry_name: &str) -> Result<&Credential> {
        self.get(registry_name)
            .ok_or_else(|| RegistryError::AuthRequired {
                registry: registry_name.to_string(),
            })
    }
}

/// Configured registries file. Many registries, exactly one default.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigFile {
    path: PathBuf,
    registries: Vec<RegistryConfig>,
}

impl RegistryConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let registries = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            registries,
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.registries)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn list_registries(&self) -> &[RegistryConfig] {
        &self.registries
    }

    pub fn get(&self, name: &str) -> Option<&RegistryConfig> {
        self.registries.iter().find(|r| r.name == name)
    }

    pub fn get_default(&self) -> Option<&RegistryConfig> {
        self.registries
            .iter()
            .find(|r| r.is_default)
            .or_else(|| self.registries.first())
    }

    /// Resolve a registry by name, or the default when none is named.
    pub fn resolve(&self, name: Option<&str>) -> Result<&RegistryConfig> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                RegistryError::Network(format!("no configured registry named '{}'", name))
            }),
            None => self.get_default().ok_or_else(|| {
                RegistryError::Network("no registries configured".to_string())
            }),
        }
    }

    /// Add or replace a registry entry. The first entry added becomes the
    /// default unless a later one claims it.
    pub fn upsert(&mut self, config: RegistryConfig) {
        if config.is_default {
            for existing in &mut self.registries {
                existing.is_default = false;
            }
        }
        self.registries.retain(|r| r.name != config.name);
        let make_default = config.is_default || self.registries.is_empty();
        let mut config = config;
        config.is_default = make_default;
        self.registries.push(config);
    }
}
