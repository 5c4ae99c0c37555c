//! Command handlers
//!
//! Each handler wires the core components together: resolve the registry,
//! load credentials, build the HTTP client, run the operation, print the
//! outcome. Friendly failures surface as `RegistryError` values that main
//! turns into plain messages.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use construct_core::lifecycle::{safe_slug, HttpNotifier, InstallOptions};
use construct_core::registry::SearchFilters;
use construct_core::{
    paths, Credential, CredentialStore, Installer, OfflineCache, RegistryApi, RegistryClient,
    RegistryConfig, RegistryConfigFile, Tier,
};

pub struct Context {
    root: PathBuf,
    registry_name: Option<String>,
}

impl Context {
    pub fn new(root: Option<PathBuf>, registry_name: Option<String>) -> Self {
        Self {
            root: root.unwrap_or_else(paths::config_dir),
            registry_name,
        }
    }

    fn credentials(&self) -> Result<CredentialStore> {
        Ok(CredentialStore::load(&self.root.join("credentials.json"))?)
    }

    fn registries(&self) -> Result<RegistryConfigFile> {
        Ok(RegistryConfigFile::load(&self.root.join("registries.json"))?)
    }

    fn cache(&self) -> OfflineCache {
        OfflineCache::new(&self.root.join("cache"))
    }

    fn constructs_dir(&self) -> PathBuf {
        self.root.join("constructs")
    }

    /// Resolve the target registry and build a client for it, attaching the
    /// stored credential's token when one exists.
    fn client(&self) -> Result<(RegistryClient, RegistryConfig)> {
        let registries = self.registries()?;
        let config = registries.resolve(self.registry_name.as_deref())?.clone();
        let credentials = self.credentials()?;
        let token = credentials
            .get(&config.name)
            .map(|c| c.auth_token().to_string());
        let client = RegistryClient::new(&config.name, &config.url, token)?;
        Ok((client, config))
    }

    /// Client plus the credential the lifecycle operations require.
    fn authenticated(&self) -> Result<(RegistryClient, RegistryConfig, Credential)> {
        let (client, config) = self.client()?;
        let credentials = self.credentials()?;
        let credential = credentials.require(&config.name)?.clone();
        Ok((client, config, credential))
    }

    fn installer(&self, client: RegistryClient) -> Installer<RegistryClient> {
        let notifier = HttpNotifier::new(Arc::new(client.clone()));
        Installer::new(client, &self.constructs_dir(), self.cache())
            .with_notifier(Box::new(notifier))
    }

    pub async fn login(
        &self,
        api_key: Option<String>,
        user: &str,
        tier: &str,
        url: Option<&str>,
    ) -> Result<()> {
        let tier: Tier = tier.parse()?;

        let mut registries = self.registries()?;
        if let Some(url) = url {
            let name = self
                .registry_name
                .clone()
                .unwrap_or_else(|| "default".to_string());
            registries.upsert(RegistryConfig {
                name,
                url: url.to_string(),
                is_default: false,
            });
            registries.save()?;
        }
        let config = registries
            .resolve(self.registry_name.as_deref())
            .context("no registries configured; pass --url to add one")?
            .clone();

        let key = match api_key {
            Some(key) => key,
            None => prompt("API key: ")?,
        };
        anyhow::ensure!(!key.is_empty(), "API key cannot be empty");

        let mut credentials = self.credentials()?;
        credentials.set(
            &config.name,
            Credential::ApiKey {
                key,
                user_id: user.to_string(),
                tier,
                expires_at: None,
            },
        );
        credentials.save()?;

        println!("Logged in to '{}' as {} ({} tier)", config.name, user, tier);
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        let registries = self.registries()?;
        let config = registries.resolve(self.registry_name.as_deref())?;

        let mut credentials = self.credentials()?;
        if credentials.remove(&config.name) {
            credentials.save()?;
            println!("Logged out of '{}'", config.name);
        } else {
            println!("No credential stored for '{}'", config.name);
        }
        Ok(())
    }

    pub fn list_installed(&self) -> Result<()> {
        let installed = construct_core::lifecycle::list_installed(&self.constructs_dir());
        if installed.is_empty() {
            println!("No constructs installed");
            return Ok(());
        }
        for construct in installed {
            println!(
                "{} {} (installed {})",
                construct.slug,
                construct.version,
                construct.installed_at.format("%Y-%m-%d")
            );
        }
        Ok(())
    }

    pub async fn list_available(&self) -> Result<()> {
        let (client, _) = self.client()?;
        let packages = client.list_available().await?;
        print_catalog(&packages);
        Ok(())
    }

    pub async fn search(
        &self,
        query: &str,
        category: Option<String>,
        tier: Option<&str>,
    ) -> Result<()> {
        let tier = tier.map(|t| t.parse::<Tier>()).transpose()?;
        let (client, _) = self.client()?;
        let packages = client.search(query, &SearchFilters { category, tier }).await?;
        if packages.is_empty() {
            println!("No constructs matched '{}'", query);
        } else {
            print_catalog(&packages);
        }
        Ok(())
    }

    pub async fn install(&self, slug: &str, version: Option<String>, repair: bool) -> Result<()> {
        let (client, _, credential) = self.authenticated()?;
        let installer = self.installer(client);

        let report = installer
            .install(slug, &credential, &InstallOptions { version, repair })
            .await?;

        println!(
            "Installed {} {} to {}",
            report.slug,
            report.version,
            report.install_dir.display()
        );
        Ok(())
    }

    pub async fn update(&self, slug: &str) -> Result<()> {
        let (client, _, credential) = self.authenticated()?;
        let installer = self.installer(client);

        let report = installer.update(slug, &credential).await?;
        for warning in &report.warnings {
            eprintln!("warning: {}", warning);
        }
        println!("Updated {} to {}", report.slug, report.version);
        Ok(())
    }

    pub async fn uninstall(&self, slug: &str) -> Result<()> {
        // Uninstall works without a reachable registry; fall back to a
        // notifier-less installer when no client can be built.
        match self.client() {
            Ok((client, _)) => self.installer(client).uninstall(slug).await?,
            Err(_) => {
                let dir = self.constructs_dir().join(safe_slug(slug));
                if !dir.exists() {
                    return Err(construct_core::RegistryError::NotInstalled(slug.to_string()).into());
                }
                std::fs::remove_dir_all(&dir)?;
                self.cache().clear_one(slug)?;
            }
        }
        println!("Uninstalled {}", slug);
        Ok(())
    }

    pub fn cache_clear(&self) -> Result<()> {
        self.cache().clear()?;
        println!("Cache cleared");
        Ok(())
    }

    pub fn cache_clear_one(&self, slug: &str) -> Result<()> {
        self.cache().clear_one(slug)?;
        println!("Removed '{}' from the cache", slug);
        Ok(())
    }

    pub fn cache_info(&self) -> Result<()> {
        let cache = self.cache();
        let entries = cache.list();
        if entries.is_empty() {
            println!("Cache is empty");
            return Ok(());
        }
        for entry in &entries {
            println!(
                "{} {} (cached {})",
                entry.slug,
                entry.version,
                entry.cached_at.format("%Y-%m-%d %H:%M")
            );
        }
        println!("{} entries, {} bytes", entries.len(), cache.size());
        Ok(())
    }
}

fn print_catalog(packages: &[construct_core::registry::PackageMetadata]) {
    for package in packages {
        let description = package.description.as_deref().unwrap_or("");
        println!(
            "{} {} [{}] {}",
            package.slug, package.latest_version, package.tier_required, description
        );
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write as _;
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use construct_core::RegistryError;
    use tempfile::tempdir;

    // Unreachable local endpoint: connection is refused immediately, no
    // request ever leaves the machine.
    const DEAD_URL: &str = "http://127.0.0.1:1/api/";

    fn context(root: &std::path::Path) -> Context {
        Context::new(Some(root.to_path_buf()), None)
    }

    #[tokio::test]
    async fn login_registers_the_registry_and_stores_the_credential() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        ctx.login(Some("ck_test".into()), "user-1", "pro", Some(DEAD_URL))
            .await
            .unwrap();

        let store = CredentialStore::load(&temp.path().join("credentials.json")).unwrap();
        let cred = store.get("default").expect("credential stored");
        assert_eq!(cred.tier(), Tier::Pro);
        assert_eq!(cred.user_id(), "user-1");

        ctx.logout().unwrap();
        let store = CredentialStore::load(&temp.path().join("credentials.json")).unwrap();
        assert!(!store.is_authenticated("default"));
    }

    #[tokio::test]
    async fn catalog_calls_go_through_the_registry_trait() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());
        ctx.login(Some("ck".into()), "user-1", "free", Some(DEAD_URL))
            .await
            .unwrap();

        let (client, _) = ctx.client().unwrap();
        let err = client.list_available().await.unwrap_err();
        assert!(matches!(err, RegistryError::Network(_)), "got {:?}", err);
        let err = client
            .search("reviewer", &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Network(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn uninstall_without_a_configured_registry_removes_the_directory() {
        let temp = tempdir().unwrap();
        let ctx = context(temp.path());

        let dir = temp.path().join("constructs").join(safe_slug("acme/pkg"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), "# pkg\n").unwrap();

        ctx.uninstall("acme/pkg").await.unwrap();
        assert!(!dir.exists());

        let err = ctx.uninstall("acme/ghost").await.unwrap_err();
        let reg_err = err.downcast_ref::<RegistryError>().expect("core error");
        assert!(matches!(reg_err, RegistryError::NotInstalled(_)));
    }
}
