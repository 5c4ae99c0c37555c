//! Lifecycle orchestration

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::cache::OfflineCache;
use crate::credentials::Credential;
use crate::error::{RegistryError, Result};
use crate::integrity;
use crate::license::{self, License};
use crate::registry::{DownloadPayload, InstallEvent, RegistryApi, UninstallEvent};

use super::lock::InstallLock;
use super::notifier::{InstallNotifier, NullNotifier};
use super::safe_slug;

/// Sibling file inside each install directory recording what was installed
/// and under which license. Its presence distinguishes an install from a
/// partial one.
const LICENSE_RECORD_FILE: &str = ".construct-license.json";

/// Local license record, ground truth for "is this still usable".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub slug: String,
    pub version: String,
    pub license: License,
    pub installed_at: DateTime<Utc>,
}

/// Installed-state classification for one slug.
#[derive(Debug, Clone)]
pub enum InstallState {
    NotInstalled,
    Installed(LicenseRecord),
    /// Directory exists without a readable license record: an interrupted
    /// earlier install. Recoverable by reinstalling.
    Partial,
}

/// Summary of one installed construct.
#[derive(Debug, Clone)]
pub struct InstalledConstruct {
    pub slug: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Specific version to install; latest when absent.
    pub version: Option<String>,
    /// Allow reinstalling over a partial install.
    pub repair: bool,
}

/// Outcome of a successful install or update.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub slug: String,
    pub version: String,
    pub install_dir: PathBuf,
    pub files_written: usize,
    /// Advisory integrity findings (update path). Never fatal.
    pub warnings: Vec<String>,
}

/// Sequences install, update and uninstall against one registry.
///
/// All roots are injected; telemetry goes through a swappable notifier
/// whose failures are logged and never propagated.
pub struct Installer<R> {
    registry: R,
    notifier: Box<dyn InstallNotifier>,
    cache: OfflineCache,
    install_root: PathBuf,
}

impl<R: RegistryApi> Installer<R> {
    pub fn new(registry: R, install_root: &Path, cache: OfflineCache) -> Self {
        Self {
            registry,
            notifier: Box::new(NullNotifier),
            cache,
            install_root: install_root.to_path_buf(),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn InstallNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    pub fn install_dir(&self, slug: &str) -> PathBuf {
        self.install_root.join(safe_slug(slug))
    }

    /// Read the license record for a slug, if one exists and parses.
    pub fn license_record(&self, slug: &str) -> Option<LicenseRecord> {
        let path = self.install_dir(slug).join(LICENSE_RECORD_FILE);
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Classify a slug's on-disk state.
    pub fn state(&self, slug: &str) -> InstallState {
        let dir = self.install_dir(slug);
        if !dir.exists() {
            return InstallState::NotInstalled;
        }
        match self.license_record(slug) {
            Some(record) => InstallState::Installed(record),
            None => InstallState::Partial,
        }
    }

    /// Install a construct.
    ///
    /// Order matters: tier check before any transfer of file contents,
    /// existence check before any write, license validation before the
    /// first file lands on disk.
    pub async fn install(
        &self,
        slug: &str,
        credential: &Credential,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        let meta = self.registry.package_metadata(slug).await?;

        let current = credential.tier();
        if !current.satisfies(meta.tier_required) {
            return Err(RegistryError::TierInsufficient {
                slug: slug.to_string(),
                required: meta.tier_required,
                current,
            });
        }

        // Fail fast before taking the lock so the common error paths touch
        // nothing on disk.
        match self.state(slug) {
            InstallState::Installed(record) => {
                return Err(RegistryError::AlreadyInstalled {
                    slug: slug.to_string(),
                    version: record.version,
                })
            }
            InstallState::Partial if !options.repair => {
                return Err(RegistryError::PartialInstall {
                    slug: slug.to_string(),
                })
            }
            _ => {}
        }

        let _lock = InstallLock::acquire(&self.install_root, slug)?;

        // Re-check under the lock; a concurrent install may have finished.
        if let InstallState::Installed(record) = self.state(slug) {
            return Err(RegistryError::AlreadyInstalled {
                slug: slug.to_string(),
                version: record.version,
            });
        }

        let download = self.registry.download(slug, options.version.as_deref()).await?;
        self.validate_download(slug, &download, meta.tier_required).await?;

        let dir = self.install_dir(slug);
        if dir.exists() {
            debug!("Repairing partial install of '{}'", slug);
            fs::remove_dir_all(&dir).await?;
        }

        let files_written = self.write_files(slug, &download).await?;
        self.write_license_record(slug, &download).await?;
        self.cache.put(slug, &download)?;

        self.notify_installed(slug, &download.skill.version).await;

        Ok(InstallReport {
            slug: slug.to_string(),
            version: download.skill.version.clone(),
            install_dir: dir,
            files_written,
            warnings: Vec::new(),
        })
    }

    /// Update an installed construct to the latest version.
    ///
    /// Existing integrity markers are verified first; local modifications
    /// become warnings on the report and the files are overwritten.
    pub async fn update(&self, slug: &str, credential: &Credential) -> Result<InstallReport> {
        match self.state(slug) {
            InstallState::NotInstalled => {
                return Err(RegistryError::NotInstalled(slug.to_string()))
            }
            InstallState::Partial => {
                return Err(RegistryError::PartialInstall {
                    slug: slug.to_string(),
                })
            }
            InstallState::Installed(_) => {}
        }

        let warnings = self.verify_installed(slug)?;
        for warning in &warnings {
            warn!("{}", warning);
        }

        let meta = self.registry.package_metadata(slug).await?;
        let current = credential.tier();
        if !current.satisfies(meta.tier_required) {
            return Err(RegistryError::TierInsufficient {
                slug: slug.to_string(),
                required: meta.tier_required,
                current,
            });
        }

        let _lock = InstallLock::acquire(&self.install_root, slug)?;

        let download = self.registry.download(slug, None).await?;
        self.validate_download(slug, &download, meta.tier_required).await?;

        let dir = self.install_dir(slug);
        fs::remove_dir_all(&dir).await?;

        let files_written = self.write_files(slug, &download).await?;
        self.write_license_record(slug, &download).await?;
        self.cache.put(slug, &download)?;

        self.notify_installed(slug, &download.skill.version).await;

        Ok(InstallReport {
            slug: slug.to_string(),
            version: download.skill.version.clone(),
            install_dir: dir,
            files_written,
            warnings,
        })
    }

    /// Uninstall a construct. Local cleanup never blocks on the remote:
    /// the telemetry call runs last and its failure is only logged.
    pub async fn uninstall(&self, slug: &str) -> Result<()> {
        let dir = self.install_dir(slug);
        if !dir.exists() {
            return Err(RegistryError::NotInstalled(slug.to_string()));
        }

        fs::remove_dir_all(&dir).await?;
        self.cache.clear_one(slug)?;

        let event = UninstallEvent {
            slug: slug.to_string(),
            uninstalled_at: Utc::now(),
        };
        if let Err(e) = self.notifier.uninstalled(&event).await {
            warn!("uninstall event delivery failed (ignored): {}", e);
        }
        Ok(())
    }

    /// Whether an installed construct is usable without a network call:
    /// its license is unexpired or within the cache's grace window.
    pub fn usable_offline(&self, slug: &str) -> bool {
        let InstallState::Installed(record) = self.state(slug) else {
            return false;
        };
        match record.license.expires_at {
            None => true,
            Some(expires_at) => Utc::now() <= expires_at + self.cache.grace_period(),
        }
    }

    /// Check integrity markers of every marked file under a slug's install
    /// directory. Returns advisory findings, one per modified file.
    pub fn verify_installed(&self, slug: &str) -> Result<Vec<String>> {
        let dir = self.install_dir(slug);
        let mut warnings = Vec::new();

        for entry in walkdir::WalkDir::new(&dir).into_iter().flatten() {
            if !entry.file_type().is_file() || !integrity::should_mark(entry.path()) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&dir)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                warnings.push(format!("could not read '{}' for integrity check", rel));
                continue;
            };
            if !integrity::has_marker(&content) {
                warnings.push(format!("'{}' is missing its integrity marker", rel));
            } else if !integrity::verify_integrity(&content) {
                warnings.push(format!("local changes detected in '{}'", rel));
            }
        }
        Ok(warnings)
    }

    /// List installs with a valid license record. Partial installs are
    /// skipped with a log line.
    pub fn list_installed(&self) -> Vec<InstalledConstruct> {
        list_installed(&self.install_root)
    }

    async fn validate_download(
        &self,
        slug: &str,
        download: &DownloadPayload,
        required: crate::license::Tier,
    ) -> Result<()> {
        let key = self.registry.public_key(&download.license.key_id).await?;
        license::validate(&download.license, &key, slug, required)
    }

    async fn write_files(&self, slug: &str, download: &DownloadPayload) -> Result<usize> {
        let dir = self.install_dir(slug);
        fs::create_dir_all(&dir).await?;

        let version = &download.skill.version;
        for file in &download.skill.files {
            let dest = dir.join(&file.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).await?;
            }
            let content = if integrity::should_mark(Path::new(&file.path)) {
                integrity::add_marker(&file.content, slug, version, Path::new(&file.path))
            } else {
                file.content.clone()
            };
            fs::write(&dest, content).await?;
        }
        Ok(download.skill.files.len())
    }

    async fn write_license_record(&self, slug: &str, download: &DownloadPayload) -> Result<()> {
        let record = LicenseRecord {
            slug: slug.to_string(),
            version: download.skill.version.clone(),
            license: download.license.clone(),
            installed_at: Utc::now(),
        };
        let path = self.install_dir(slug).join(LICENSE_RECORD_FILE);
        let contents = serde_json::to_string_pretty(&record)?;
        fs::write(path, contents).await?;
        Ok(())
    }

    async fn notify_installed(&self, slug: &str, version: &str) {
        let event = InstallEvent {
            slug: slug.to_string(),
            version: version.to_string(),
            installed_at: Utc::now(),
        };
        if let Err(e) = self.notifier.installed(&event).await {
            warn!("install event delivery failed (ignored): {}", e);
        }
    }
}

/// Scan an install root for constructs with a valid license record.
/// Partial installs are skipped with a log line.
pub fn list_installed(install_root: &Path) -> Vec<InstalledConstruct> {
    let Ok(entries) = std::fs::read_dir(install_root) else {
        return Vec::new();
    };

    let mut installed = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let record_path = entry.path().join(LICENSE_RECORD_FILE);
        let Ok(contents) = std::fs::read_to_string(&record_path) else {
            warn!(
                "Skipping '{}': no license record (partial install?)",
                entry.path().display()
            );
            continue;
        };
        match serde_json::from_str::<LicenseRecord>(&contents) {
            Ok(record) => installed.push(InstalledConstruct {
                slug: record.slug,
                version: record.version,
                installed_at: record.installed_at,
                path: entry.path(),
            }),
            Err(e) => {
                warn!(
                    "Skipping '{}': unreadable license record: {}",
                    entry.path().display(),
                    e
                );
            }
        }
    }
    installed.sort_by(|a, b| a.slug.cmp(&b.slug));
    installed
}
