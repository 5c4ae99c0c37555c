//! Registry wire boundary
//!
//! Typed contract for the remote registry. Payloads are parsed into the
//! structures in [`types`] immediately on receipt; nothing downstream of
//! this module touches raw JSON.

mod client;
mod types;

pub use client::RegistryClient;
pub use types::{
    DownloadPayload, InstallEvent, PackageFile, PackageMetadata, PublicKeyRecord, SearchFilters,
    SkillPayload, UninstallEvent,
};

use async_trait::async_trait;

use crate::error::Result;

/// Read surface of the remote registry the lifecycle orchestrator depends
/// on. The HTTP implementation is [`RegistryClient`]; tests substitute an
/// in-memory one.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Fetch package metadata (tier requirement, latest version).
    async fn package_metadata(&self, slug: &str) -> Result<PackageMetadata>;

    /// Fetch the full download payload: files plus a freshly issued license.
    async fn download(&self, slug: &str, version: Option<&str>) -> Result<DownloadPayload>;

    /// Resolve a signing key by id, or by the `"default"` alias.
    async fn public_key(&self, key_id: &str) -> Result<PublicKeyRecord>;

    /// List packages available on the registry.
    async fn list_available(&self) -> Result<Vec<PackageMetadata>>;

    /// Search packages by query, optionally filtered.
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<PackageMetadata>>;
}
