//! Error taxonomy for registry operations
//!
//! Variants map one-to-one to user-facing outcomes: the CLI matches on them
//! to decide between a friendly message and a propagated failure. Errors
//! that block correctness (auth, tier, signature) are raised before any
//! filesystem mutation; advisory conditions (integrity warnings, telemetry)
//! never surface here.

use chrono::{DateTime, Utc};

use crate::license::Tier;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No credential stored for the target registry.
    #[error("not logged in to registry '{registry}'. Run `construct login` first")]
    AuthRequired { registry: String },

    /// The credential's tier does not satisfy the package requirement.
    #[error("'{slug}' requires the {required} tier (your tier: {current}). Upgrade your plan to install it")]
    TierInsufficient {
        slug: String,
        required: Tier,
        current: Tier,
    },

    /// Package or requested version does not exist on the registry.
    #[error("package '{0}' not found on the registry")]
    PackageNotFound(String),

    /// A signing key id resolved to nothing.
    #[error("signing key '{0}' not found")]
    KeyNotFound(String),

    /// Registry unreachable or timed out. Timeouts are not distinguished.
    #[error("registry unreachable: {0}")]
    Network(String),

    /// Wire payload failed boundary validation.
    #[error("invalid registry payload: {0}")]
    InvalidPayload(String),

    /// License signature did not verify against the named key.
    #[error("license signature verification failed: {0}")]
    Signature(String),

    /// License expired (beyond any applicable grace window).
    #[error("license expired at {0}")]
    LicenseExpired(DateTime<Utc>),

    /// Install directory already holds a valid install of this slug.
    #[error("'{slug}' {version} is already installed. Run `construct update {slug}` or uninstall it first")]
    AlreadyInstalled { slug: String, version: String },

    /// Slug has no install directory.
    #[error("'{0}' is not installed")]
    NotInstalled(String),

    /// Install directory exists without a valid license record - a crashed
    /// or interrupted earlier install. Recoverable via `install --repair`.
    #[error("'{slug}' has a partial install (directory present, license record missing or unreadable). Run `construct install {slug} --repair` to reinstall")]
    PartialInstall { slug: String },

    /// Another process holds the per-slug install lock.
    #[error("another install of '{0}' is already in progress")]
    InstallLocked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
