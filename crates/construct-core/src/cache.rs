//! Offline cache
//!
//! Persists the last successful download per slug so an installed construct
//! stays usable when the registry is unreachable. An expired license is
//! still served within a bounded grace window after expiry; past the window
//! the entry is withheld. The window defaults to 24 hours and is injectable
//! so the boundary is testable.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::registry::DownloadPayload;

/// Grace window after license expiry during which a cached download is
/// still served.
pub fn default_grace_period() -> Duration {
    Duration::hours(24)
}

/// One cached download.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPackage {
    pub slug: String,
    pub version: String,
    pub download: DownloadPayload,
    pub cached_at: DateTime<Utc>,
}

/// Summary returned by [`OfflineCache::info`].
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub slug: String,
    pub version: String,
    pub cached_at: DateTime<Utc>,
}

/// Directory-backed cache, one JSON file per slug.
#[derive(Debug, Clone)]
pub struct OfflineCache {
    dir: PathBuf,
    grace_period: Duration,
}

impl OfflineCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            grace_period: default_grace_period(),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Slashes in slugs are replaced for filesystem safety.
    fn entry_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug.replace('/', "_")))
    }

    /// Store the download for a slug, overwriting any previous entry.
    pub fn put(&self, slug: &str, download: &DownloadPayload) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CachedPackage {
            slug: slug.to_string(),
            version: download.skill.version.clone(),
            download: download.clone(),
            cached_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&entry)?;
        fs::write(self.entry_path(slug), contents)?;
        Ok(())
    }

    fn read_entry(&self, slug: &str) -> Option<CachedPackage> {
        let path = self.entry_path(slug);
        if !path.exists() {
            return None;
        }
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Discarding unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the cached download unless its license expired beyond the grace
    /// window.
    pub fn get(&self, slug: &str) -> Option<DownloadPayload> {
        let entry = self.read_entry(slug)?;
        match entry.download.license.expires_at {
            Some(expires_at) if Utc::now() > expires_at + self.grace_period => {
                debug!(
                    "Cache entry for '{}' expired at {} and is past the grace window",
                    slug, expires_at
                );
                None
            }
            _ => Some(entry.download),
        }
    }

    /// Version and timestamp for a cached slug, grace policy not applied.
    pub fn info(&self, slug: &str) -> Option<CacheEntryInfo> {
        let entry = self.read_entry(slug)?;
        Some(CacheEntryInfo {
            slug: entry.slug,
            version: entry.version,
            cached_at: entry.cached_at,
        })
    }

    /// List info for every entry in the cache.
    pub fn list(&self) -> Vec<CacheEntryInfo> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut infos: Vec<CacheEntryInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let contents = fs::read_to_string(entry.path()).ok()?;
                let cached: CachedPackage = serde_json::from_str(&contents).ok()?;
                Some(CacheEntryInfo {
                    slug: cached.slug,
                    version: cached.version,
                    cached_at: cached.cached_at,
                })
            })
            .collect();
        infos.sort_by(|a, b| a.slug.cmp(&b.slug));
        infos
    }

    /// Remove every cached entry.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Remove the entry for one slug. Missing entries are not an error.
    pub fn clear_one(&self, slug: &str) -> Result<()> {
        let path = self.entry_path(slug);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Total size of the cache directory in bytes.
    pub fn size(&self) -> u64 {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .flatten()
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::{License, LicenseType, Tier};
    use crate::registry::{PackageFile, SkillPayload};
    use tempfile::tempdir;

    fn download_expiring(expires_at: Option<DateTime<Utc>>) -> DownloadPayload {
        DownloadPayload {
            skill: SkillPayload {
                name: "Reviewer".to_string(),
                version: "1.0.0".to_string(),
                files: vec![PackageFile {
                    path: "SKILL.md".to_string(),
                    content: "# Reviewer\n".to_string(),
                }],
            },
            license: License {
                license_type: LicenseType::Subscription,
                tier: Tier::Pro,
                expires_at,
                watermark: "user-1-w".to_string(),
                signature: "sig".to_string(),
                key_id: "k1".to_string(),
            },
            cache_ttl: Some(3600),
        }
    }

    #[test]
    fn round_trips_a_download() {
        let temp = tempdir().unwrap();
        let cache = OfflineCache::new(temp.path());

        cache.put("acme/reviewer", &download_expiring(None)).unwrap();

        let got = cache.get("acme/reviewer").expect("served");
        assert_eq!(got.skill.version, "1.0.0");

        let info = cache.info("acme/reviewer").expect("info");
        assert_eq!(info.version, "1.0.0");
        assert!(cache.size() > 0);
    }

    #[test]
    fn serves_within_grace_window_denies_past_it() {
        let temp = tempdir().unwrap();
        let cache = OfflineCache::new(temp.path());

        // Expired 23h59m ago: still inside the 24h window.
        let just_inside = Utc::now() - (Duration::hours(23) + Duration::minutes(59));
        cache.put("pkg", &download_expiring(Some(just_inside))).unwrap();
        assert!(cache.get("pkg").is_some(), "inside grace window must serve");

        // Expired 24h01m ago: past the window.
        let just_past = Utc::now() - (Duration::hours(24) + Duration::minutes(1));
        cache.put("pkg", &download_expiring(Some(just_past))).unwrap();
        assert!(cache.get("pkg").is_none(), "past grace window must deny");
    }

    #[test]
    fn grace_period_is_injectable() {
        let temp = tempdir().unwrap();
        let cache = OfflineCache::new(temp.path()).with_grace_period(Duration::minutes(5));

        let expired = Utc::now() - Duration::minutes(10);
        cache.put("pkg", &download_expiring(Some(expired))).unwrap();
        assert!(cache.get("pkg").is_none());

        let barely = Utc::now() - Duration::minutes(4);
        cache.put("pkg", &download_expiring(Some(barely))).unwrap();
        assert!(cache.get("pkg").is_some());
    }

    #[test]
    fn clear_one_and_clear() {
        let temp = tempdir().unwrap();
        let cache = OfflineCache::new(temp.path());

        cache.put("a/one", &download_expiring(None)).unwrap();
        cache.put("b/two", &download_expiring(None)).unwrap();
        assert_eq!(cache.list().len(), 2);

        cache.clear_one("a/one").unwrap();
        assert!(cache.get("a/one").is_none());
        assert!(cache.get("b/two").is_some());

        cache.clear().unwrap();
        assert!(cache.get("b/two").is_none());
        assert_eq!(cache.size(), 0);

        // clearing again is fine
        cache.clear().unwrap();
        cache.clear_one("a/one").unwrap();
    }

    #[test]
    fn slug_slashes_are_filesystem_safe() {
        let temp = tempdir().unwrap();
        let cache = OfflineCache::new(temp.path());
        cache.put("acme/deep/slug", &download_expiring(None)).unwrap();
        assert!(temp.path().join("acme_deep_slug.json").exists());
    }
}
