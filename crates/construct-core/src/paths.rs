//! Centralized path utilities
//!
//! Default locations under ~/.construct. Every component also accepts an
//! explicit root, so these are conveniences for the CLI, not ambient state.

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".construct";

/// Get the construct config directory (~/.construct)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the credentials file (~/.construct/credentials.json)
pub fn credentials_path() -> PathBuf {
    config_dir().join("credentials.json")
}

/// Get the registry config file (~/.construct/registries.json)
pub fn registries_path() -> PathBuf {
    config_dir().join("registries.json")
}

/// Get the offline cache directory (~/.construct/cache)
pub fn cache_dir() -> PathBuf {
    config_dir().join("cache")
}

/// Get the install root for constructs (~/.construct/constructs)
pub fn constructs_dir() -> PathBuf {
    config_dir().join("constructs")
}
