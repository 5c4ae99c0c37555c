//! construct - registry client for licensed AI-agent skill packages
//!
//! Subcommands cover the full lifecycle: login/logout against a configured
//! registry, browsing and searching the catalog, installing, updating and
//! uninstalling constructs, and inspecting the offline cache.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use construct_core::RegistryError;

mod commands;

/// construct - licensed AI-agent skills from a registry
#[derive(Parser)]
#[command(name = "construct")]
#[command(about = "Install and manage licensed AI-agent skill packages", long_about = None)]
struct Cli {
    /// Config root (default ~/.construct). Useful for testing and sandboxes.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Registry to talk to (default: the configured default registry)
    #[arg(long, global = true)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a credential for a registry
    Login {
        /// API key; prompted for on stdin when omitted
        #[arg(long)]
        api_key: Option<String>,
        /// User id the key belongs to
        #[arg(long)]
        user: String,
        /// Subscription tier of the credential (free|pro|team|enterprise)
        #[arg(long, default_value = "free")]
        tier: String,
        /// Registry base URL; registers the registry if not yet configured
        #[arg(long)]
        url: Option<String>,
    },

    /// Remove the stored credential for a registry
    Logout,

    /// List constructs
    List {
        /// Only installed constructs (default)
        #[arg(long, conflicts_with = "available")]
        installed: bool,
        /// Constructs available on the registry
        #[arg(long)]
        available: bool,
    },

    /// Search the registry catalog
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        /// Filter by required tier (free|pro|team|enterprise)
        #[arg(long)]
        tier: Option<String>,
    },

    /// Install a construct
    Install {
        slug: String,
        /// Specific version; latest when omitted
        #[arg(long)]
        version: Option<String>,
        /// Reinstall over a partial (crashed) install
        #[arg(long)]
        repair: bool,
    },

    /// Update an installed construct to the latest version
    Update { slug: String },

    /// Uninstall a construct
    Uninstall { slug: String },

    /// Inspect or clear the offline cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove every cached download
    Clear,
    /// Remove the cached download for one slug
    ClearOne { slug: String },
    /// Show cache contents and total size
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context::new(cli.root, cli.registry);

    let result = match cli.command {
        Commands::Login {
            api_key,
            user,
            tier,
            url,
        } => ctx.login(api_key, &user, &tier, url.as_deref()).await,
        Commands::Logout => ctx.logout(),
        Commands::List {
            installed: _,
            available,
        } => {
            if available {
                ctx.list_available().await
            } else {
                ctx.list_installed()
            }
        }
        Commands::Search {
            query,
            category,
            tier,
        } => ctx.search(&query, category, tier.as_deref()).await,
        Commands::Install {
            slug,
            version,
            repair,
        } => ctx.install(&slug, version, repair).await,
        Commands::Update { slug } => ctx.update(&slug).await,
        Commands::Uninstall { slug } => ctx.uninstall(&slug).await,
        Commands::Cache { command } => match command {
            CacheCommands::Clear => ctx.cache_clear(),
            CacheCommands::ClearOne { slug } => ctx.cache_clear_one(&slug),
            CacheCommands::Info => ctx.cache_info(),
        },
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            // Expected outcomes get a plain message and a clean non-zero
            // exit; everything else propagates with its full error chain.
            if let Some(reg_err) = err.downcast_ref::<RegistryError>() {
                if is_user_facing(reg_err) {
                    eprintln!("{}", reg_err);
                    std::process::exit(1);
                }
            }
            Err(err)
        }
    }
}

fn is_user_facing(err: &RegistryError) -> bool {
    matches!(
        err,
        RegistryError::AuthRequired { .. }
            | RegistryError::TierInsufficient { .. }
            | RegistryError::PackageNotFound(_)
            | RegistryError::AlreadyInstalled { .. }
            | RegistryError::NotInstalled(_)
            | RegistryError::PartialInstall { .. }
            | RegistryError::InstallLocked(_)
    )
}
