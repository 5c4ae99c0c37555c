//! Advisory per-slug install lock
//!
//! Two processes installing the same slug would otherwise race on directory
//! creation and cache writes. The lock is a `create_new` file in the
//! install root, removed on drop. A stale lock (crashed process) must be
//! removed by hand; the error message names the file.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{RegistryError, Result};

use super::safe_slug;

#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    /// Take the advisory lock for `slug`, failing fast if another holder
    /// exists.
    pub fn acquire(install_root: &Path, slug: &str) -> Result<Self> {
        fs::create_dir_all(install_root)?;
        let path = install_root.join(format!(".{}.lock", safe_slug(slug)));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                debug!("Acquired install lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RegistryError::InstallLocked(slug.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_until_released() {
        let temp = tempdir().unwrap();

        let first = InstallLock::acquire(temp.path(), "acme/pkg").unwrap();
        let err = InstallLock::acquire(temp.path(), "acme/pkg").unwrap_err();
        assert!(matches!(err, RegistryError::InstallLocked(_)));

        // Different slug is independent.
        let _other = InstallLock::acquire(temp.path(), "acme/other").unwrap();

        drop(first);
        InstallLock::acquire(temp.path(), "acme/pkg").expect("released lock reacquires");
    }
}
