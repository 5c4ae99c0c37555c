//! HTTP registry client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{RegistryError, Result};

use super::types::{
    DownloadPayload, InstallEvent, PackageMetadata, PublicKeyRecord, SearchFilters, UninstallEvent,
};
use super::RegistryApi;

/// Every registry round trip gets a bounded timeout; a timeout is treated
/// the same as unreachable.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Public keys are cached client-side matching the server's 4h
/// cache-control so validation does not refetch the key every time.
const KEY_CACHE_TTL: Duration = Duration::from_secs(4 * 3600);

/// Typed client for one configured registry endpoint. Cloning shares the
/// underlying connection pool and key cache.
#[derive(Clone, Debug)]
pub struct RegistryClient {
    registry_name: String,
    base: Url,
    auth_token: Option<String>,
    http: reqwest::Client,
    key_cache: moka::sync::Cache<String, PublicKeyRecord>,
}

impl RegistryClient {
    pub fn new(registry_name: &str, base_url: &str, auth_token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RegistryError::Network(format!("invalid registry url '{}': {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("construct/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        let key_cache = moka::sync::Cache::builder()
            .max_capacity(64)
            .time_to_live(KEY_CACHE_TTL)
            .build();

        Ok(Self {
            registry_name: registry_name.to_string(),
            base,
            auth_token,
            http,
            key_cache,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| RegistryError::Network(format!("invalid endpoint '{}': {}", path, e)))
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, not_found: RegistryError) -> Result<T> {
        let resp = self
            .request(url)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(not_found),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(RegistryError::AuthRequired {
                    registry: self.registry_name.clone(),
                })
            }
            status if !status.is_success() => {
                return Err(RegistryError::Network(format!(
                    "registry returned {}",
                    status
                )))
            }
            _ => {}
        }

        resp.json::<T>()
            .await
            .map_err(|e| RegistryError::InvalidPayload(e.to_string()))
    }

    async fn post_event<T: serde::Serialize>(&self, path: &str, event: &T) -> Result<()> {
        let url = self.endpoint(path)?;
        let mut req = self.http.post(url).json(event);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RegistryError::Network(format!(
                "event endpoint returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Best-effort install telemetry. Callers log failures, never propagate.
    pub async fn notify_install(&self, event: &InstallEvent) -> Result<()> {
        self.post_event("install-events", event).await
    }

    /// Best-effort uninstall telemetry.
    pub async fn notify_uninstall(&self, event: &UninstallEvent) -> Result<()> {
        self.post_event("uninstall-events", event).await
    }
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn package_metadata(&self, slug: &str) -> Result<PackageMetadata> {
        let url = self.endpoint(&format!("skills/{}", slug))?;
        self.get_json(url, RegistryError::PackageNotFound(slug.to_string()))
            .await
    }

    async fn download(&self, slug: &str, version: Option<&str>) -> Result<DownloadPayload> {
        let mut url = self.endpoint(&format!("skills/{}/download", slug))?;
        if let Some(version) = version {
            url.query_pairs_mut().append_pair("version", version);
        }
        let payload: DownloadPayload = self
            .get_json(url, RegistryError::PackageNotFound(slug.to_string()))
            .await?;
        payload.validate_shape(slug)?;
        Ok(payload)
    }

    async fn public_key(&self, key_id: &str) -> Result<PublicKeyRecord> {
        if let Some(cached) = self.key_cache.get(key_id) {
            return Ok(cached);
        }

        let url = self.endpoint(&format!("public-keys/{}", key_id))?;
        let record: PublicKeyRecord = self
            .get_json(url, RegistryError::KeyNotFound(key_id.to_string()))
            .await?;

        self.key_cache.insert(key_id.to_string(), record.clone());
        Ok(record)
    }

    async fn list_available(&self) -> Result<Vec<PackageMetadata>> {
        let url = self.endpoint("skills")?;
        self.get_json(url, RegistryError::Network("skill index not found".into()))
            .await
    }

    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<PackageMetadata>> {
        let mut url = self.endpoint("skills")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            if let Some(category) = &filters.category {
                pairs.append_pair("category", category);
            }
            if let Some(tier) = filters.tier {
                pairs.append_pair("tier", tier.as_str());
            }
        }
        self.get_json(url, RegistryError::Network("skill index not found".into()))
            .await
    }
}
