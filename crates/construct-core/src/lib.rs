//! Core library for the construct registry client
//!
//! Implements the license-gated distribution and integrity subsystem:
//! - `hashing` / `integrity` - tamper-evident markers for installed text files
//! - `credentials` - per-registry credential and registry config storage
//! - `keys` - the registry-side signing-key directory (rotation, revocation)
//! - `license` - tier ordering, signed-license validation, watermarks
//! - `cache` - offline cache with a bounded grace period after expiry
//! - `registry` - typed HTTP client for the registry wire contract
//! - `lifecycle` - install/update/uninstall orchestration
//!
//! Every component takes its filesystem roots explicitly so tests can point
//! the whole stack at a temporary directory.

pub mod cache;
pub mod credentials;
pub mod error;
pub mod hashing;
pub mod integrity;
pub mod keys;
pub mod license;
pub mod lifecycle;
pub mod paths;
pub mod registry;

pub use cache::OfflineCache;
pub use credentials::{Credential, CredentialStore, RegistryConfig, RegistryConfigFile};
pub use error::RegistryError;
pub use keys::KeyDirectory;
pub use license::{License, LicenseType, Tier};
pub use lifecycle::Installer;
pub use registry::{RegistryApi, RegistryClient};
