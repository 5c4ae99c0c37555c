//! Signing-key directory
//!
//! Registry-side store of rotating license-signing keys, SQLite-backed.
//! Invariant: at most one record is current and unrevoked at a time;
//! rotation happens inside a single transaction so there is never a window
//! with zero or two current keys. Revoked keys are excluded from every
//! lookup even while their stored `is_current` flag is stale.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension as _};

use crate::error::{RegistryError, Result};
use crate::registry::PublicKeyRecord;

/// Alias that resolves to whatever key is currently marked current.
pub const DEFAULT_KEY_ALIAS: &str = "default";

/// Stored signing-key record.
#[derive(Debug, Clone)]
pub struct SigningKeyRecord {
    pub key_id: String,
    pub algorithm: String,
    pub public_key_pem: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}

impl SigningKeyRecord {
    fn into_public(self) -> PublicKeyRecord {
        PublicKeyRecord {
            key_id: self.key_id,
            algorithm: self.algorithm,
            public_key_pem: self.public_key_pem,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterKeyOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub make_current: bool,
}

/// SQLite-backed key directory.
pub struct KeyDirectory {
    conn: Connection,
    /// Key id the server is configured to issue with; used by the
    /// environment-key fallback.
    current_key_id: Option<String>,
    /// Statically configured environment key, served when the configured
    /// current key id has no stored record.
    fallback_key: Option<PublicKeyRecord>,
}

impl KeyDirectory {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS signing_keys (
                key_id TEXT PRIMARY KEY,
                algorithm TEXT NOT NULL,
                public_key_pem TEXT NOT NULL,
                expires_at TEXT,
                revoked_at TEXT,
                is_current INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        Ok(Self {
            conn,
            current_key_id: None,
            fallback_key: None,
        })
    }

    /// Configure the environment-key fallback for the named current key id.
    pub fn with_fallback(mut self, current_key_id: &str, fallback: PublicKeyRecord) -> Self {
        self.current_key_id = Some(current_key_id.to_string());
        self.fallback_key = Some(fallback);
        self
    }

    /// Register a key. With `make_current`, the previous current flag is
    /// cleared in the same transaction as the insert.
    pub fn register_key(
        &mut self,
        key_id: &str,
        public_key_pem: &str,
        options: RegisterKeyOptions,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        if options.make_current {
            tx.execute("UPDATE signing_keys SET is_current = 0", [])?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO signing_keys
                (key_id, algorithm, public_key_pem, expires_at, revoked_at, is_current)
             VALUES (?1, 'ed25519', ?2, ?3, NULL, ?4)",
            params![
                key_id,
                public_key_pem,
                options.expires_at.map(|t| t.to_rfc3339()),
                options.make_current as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Revoke a key. Subsequent lookups exclude it, including through the
    /// default alias.
    pub fn revoke_key(&self, key_id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE signing_keys SET revoked_at = ?1 WHERE key_id = ?2 AND revoked_at IS NULL",
            params![Utc::now().to_rfc3339(), key_id],
        )?;
        if changed == 0 {
            return Err(RegistryError::KeyNotFound(key_id.to_string()));
        }
        Ok(())
    }

    /// Look up a key by id or by the `"default"` alias.
    ///
    /// Resolution order: literal id among non-revoked, non-expired stored
    /// records; then the environment fallback when the requested id matches
    /// the configured current key id; otherwise not found.
    pub fn get_public_key(&self, key_id: &str) -> Result<PublicKeyRecord> {
        if key_id == DEFAULT_KEY_ALIAS {
            if let Some(record) = self.lookup_current()? {
                return Ok(record.into_public());
            }
            // No stored current key: fall through to the configured id.
            let Some(configured) = self.current_key_id.clone() else {
                return Err(RegistryError::KeyNotFound(DEFAULT_KEY_ALIAS.to_string()));
            };
            return self.get_public_key(&configured);
        }

        if let Some(record) = self.lookup_by_id(key_id)? {
            return Ok(record.into_public());
        }

        if let (Some(current), Some(fallback)) = (&self.current_key_id, &self.fallback_key) {
            if key_id == current {
                return Ok(fallback.clone());
            }
        }

        Err(RegistryError::KeyNotFound(key_id.to_string()))
    }

    fn lookup_by_id(&self, key_id: &str) -> Result<Option<SigningKeyRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT key_id, algorithm, public_key_pem, expires_at, revoked_at, is_current
                 FROM signing_keys WHERE key_id = ?1 AND revoked_at IS NULL",
                params![key_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row.map(Self::parse_row).transpose()?.filter(not_expired))
    }

    fn lookup_current(&self) -> Result<Option<SigningKeyRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT key_id, algorithm, public_key_pem, expires_at, revoked_at, is_current
                 FROM signing_keys WHERE is_current = 1 AND revoked_at IS NULL",
                [],
                Self::map_row,
            )
            .optional()?;
        Ok(row.map(Self::parse_row).transpose()?.filter(not_expired))
    }

    /// List all stored records, revoked ones included. Administrative view.
    pub fn list_keys(&self) -> Result<Vec<SigningKeyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT key_id, algorithm, public_key_pem, expires_at, revoked_at, is_current
             FROM signing_keys ORDER BY key_id",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::parse_row).collect()
    }

    #[allow(clippy::type_complexity)]
    fn map_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(String, String, String, Option<String>, Option<String>, i64)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn parse_row(
        (key_id, algorithm, public_key_pem, expires_at, revoked_at, is_current): (
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            i64,
        ),
    ) -> Result<SigningKeyRecord> {
        Ok(SigningKeyRecord {
            key_id,
            algorithm,
            public_key_pem,
            expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
            revoked_at: revoked_at.as_deref().map(parse_timestamp).transpose()?,
            is_current: is_current != 0,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RegistryError::InvalidPayload(format!("bad stored timestamp '{}': {}", raw, e)))
}

fn not_expired(record: &SigningKeyRecord) -> bool {
    record.expires_at.map(|t| t > Utc::now()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn directory_with(keys: &[(&str, bool)]) -> KeyDirectory {
        let mut dir = KeyDirectory::open_in_memory().unwrap();
        for (key_id, current) in keys {
            dir.register_key(
                key_id,
                &format!("pem-{}", key_id),
                RegisterKeyOptions {
                    make_current: *current,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn rotation_moves_the_default_alias_without_invalidating_old_keys() {
        let dir = directory_with(&[("k1", true), ("k2", true)]);

        // default now resolves to k2
        assert_eq!(dir.get_public_key(DEFAULT_KEY_ALIAS).unwrap().key_id, "k2");
        // k1 is still valid by literal id
        assert_eq!(dir.get_public_key("k1").unwrap().key_id, "k1");

        // only one current row exists
        let currents = dir
            .list_keys()
            .unwrap()
            .into_iter()
            .filter(|k| k.is_current && k.revoked_at.is_none())
            .count();
        assert_eq!(currents, 1);
    }

    #[test]
    fn revocation_excludes_a_key_from_lookup() {
        let dir = directory_with(&[("k1", true), ("k2", true)]);
        dir.revoke_key("k1").unwrap();

        let err = dir.get_public_key("k1").unwrap_err();
        assert!(matches!(err, RegistryError::KeyNotFound(_)));
        // k2 unaffected
        assert_eq!(dir.get_public_key("k2").unwrap().key_id, "k2");
    }

    #[test]
    fn revoked_current_key_does_not_resolve_through_default() {
        let dir = directory_with(&[("k1", true)]);
        dir.revoke_key("k1").unwrap();

        let err = dir.get_public_key(DEFAULT_KEY_ALIAS).unwrap_err();
        assert!(matches!(err, RegistryError::KeyNotFound(_)));
    }

    #[test]
    fn expired_keys_are_excluded() {
        let mut dir = KeyDirectory::open_in_memory().unwrap();
        dir.register_key(
            "old",
            "pem-old",
            RegisterKeyOptions {
                expires_at: Some(Utc::now() - Duration::days(1)),
                make_current: true,
            },
        )
        .unwrap();

        assert!(dir.get_public_key("old").is_err());
        assert!(dir.get_public_key(DEFAULT_KEY_ALIAS).is_err());
    }

    #[test]
    fn environment_fallback_serves_the_configured_current_key() {
        let fallback = PublicKeyRecord {
            key_id: "env-key".to_string(),
            algorithm: "ed25519".to_string(),
            public_key_pem: "pem-env".to_string(),
            expires_at: None,
        };
        let dir = KeyDirectory::open_in_memory()
            .unwrap()
            .with_fallback("env-key", fallback);

        // No stored record for env-key, so the fallback answers.
        assert_eq!(dir.get_public_key("env-key").unwrap().public_key_pem, "pem-env");
        assert_eq!(dir.get_public_key(DEFAULT_KEY_ALIAS).unwrap().key_id, "env-key");
        // Unrelated ids still miss.
        assert!(dir.get_public_key("other").is_err());
    }

    #[test]
    fn revoking_an_unknown_key_is_an_error() {
        let dir = directory_with(&[]);
        assert!(matches!(
            dir.revoke_key("ghost").unwrap_err(),
            RegistryError::KeyNotFound(_)
        ));
    }
}
