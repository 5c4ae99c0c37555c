//! Install/update/uninstall lifecycle
//!
//! The orchestrator sequences tier-check, fetch, license validation, file
//! writes, caching and best-effort telemetry. Transient states are never
//! persisted: a crash mid-sequence leaves whatever the last completed step
//! wrote, and a later install detects that as a partial install rather than
//! an installed package.

mod installer;
mod lock;
mod notifier;

pub use installer::{
    list_installed, InstallOptions, InstallReport, InstallState, InstalledConstruct, Installer,
    LicenseRecord,
};
pub use lock::InstallLock;
pub use notifier::{HttpNotifier, InstallNotifier, NullNotifier};

/// Filesystem-safe form of a slug (slashes replaced). Install directories,
/// lock files and cache entries all derive their names from this.
pub fn safe_slug(slug: &str) -> String {
    slug.replace('/', "_")
}
