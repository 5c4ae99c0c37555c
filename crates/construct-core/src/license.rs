//! Licenses, tiers, and signature validation
//!
//! A license is issued by the registry alongside every download and is
//! immutable after issuance. Validation checks, in order: ed25519 signature
//! against the named signing key, expiry, then tier. The first failure wins
//! and its reason tells the caller whether to refetch a rotated key, refresh
//! the subscription, or prompt an upgrade.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::registry::PublicKeyRecord;

/// Subscription tier. The derived `Ord` gives the access order
/// free < pro < team < enterprise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Team,
    Enterprise,
}

impl Tier {
    /// Equal or higher tier always satisfies a lower-or-equal requirement.
    pub fn satisfies(self, required: Tier) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Team => "team",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "team" => Ok(Tier::Team),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(anyhow::anyhow!("unknown tier '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    Subscription,
    Free,
}

impl LicenseType {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseType::Subscription => "subscription",
            LicenseType::Free => "free",
        }
    }
}

/// Signed license embedded in a download payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(rename = "type")]
    pub license_type: LicenseType,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub watermark: String,
    /// Base64 ed25519 signature over [`signing_payload`].
    pub signature: String,
    pub key_id: String,
}

/// Canonical byte string the registry signs for a license.
pub fn signing_payload(license: &License) -> String {
    let expires = license
        .expires_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{}|{}|{}|{}",
        license.license_type.as_str(),
        license.tier.as_str(),
        expires,
        license.watermark
    )
}

/// Validate a license against the key record it names.
///
/// The key record's own expiry is re-checked here even though the key
/// directory filters expired keys on lookup; a partially updated key cache
/// must not let an expired key vouch for anything.
pub fn validate(
    license: &License,
    key: &PublicKeyRecord,
    slug: &str,
    required: Tier,
) -> Result<(), RegistryError> {
    if let Some(key_expiry) = key.expires_at {
        if key_expiry <= Utc::now() {
            return Err(RegistryError::Signature(format!(
                "signing key '{}' expired at {}",
                key.key_id, key_expiry
            )));
        }
    }

    verify_signature(license, &key.public_key_pem)?;

    if let Some(expires_at) = license.expires_at {
        if expires_at <= Utc::now() {
            return Err(RegistryError::LicenseExpired(expires_at));
        }
    }

    if !license.tier.satisfies(required) {
        return Err(RegistryError::TierInsufficient {
            slug: slug.to_string(),
            required,
            current: license.tier,
        });
    }

    Ok(())
}

fn verify_signature(license: &License, public_key: &str) -> Result<(), RegistryError> {
    let signature_raw = BASE64
        .decode(&license.signature)
        .map_err(|_| RegistryError::Signature("invalid signature encoding (expected base64)".into()))?;
    let signature = Signature::from_slice(&signature_raw)
        .map_err(|e| RegistryError::Signature(format!("invalid signature bytes: {}", e)))?;

    let verifying_key = decode_verifying_key(public_key)?;

    verifying_key
        .verify(signing_payload(license).as_bytes(), &signature)
        .map_err(|e| RegistryError::Signature(e.to_string()))
}

/// Decode an ed25519 verifying key from PEM-armored or bare base64 input.
///
/// Accepts raw 32-byte keys and SPKI DER (where the key is the trailing
/// 32 bytes).
pub fn decode_verifying_key(input: &str) -> Result<VerifyingKey, RegistryError> {
    let body: String = input
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");

    let raw = BASE64
        .decode(body.trim())
        .map_err(|_| RegistryError::Signature("invalid public key encoding (expected base64)".into()))?;

    if raw.len() < 32 {
        return Err(RegistryError::Signature(format!(
            "invalid public key length: {} bytes",
            raw.len()
        )));
    }
    let key_bytes: [u8; 32] = raw[raw.len() - 32..]
        .try_into()
        .map_err(|_| RegistryError::Signature("invalid public key length".into()))?;

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| RegistryError::Signature(format!("invalid ed25519 public key: {}", e)))
}

/// Derive a per-issuance watermark for leak-provenance tracing.
///
/// User id plus fresh randomness; two issuances for the same user are never
/// equal. Not an authorization input.
pub fn issue_watermark(user_id: &str) -> String {
    format!("{}-{}", user_id, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::{Signer as _, SigningKey};

    fn test_key() -> (SigningKey, String) {
        let signing_key = SigningKey::from_bytes(&[42u8; 32]);
        let public_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());
        (signing_key, public_b64)
    }

    fn signed_license(
        signing_key: &SigningKey,
        tier: Tier,
        expires_at: Option<DateTime<Utc>>,
    ) -> License {
        let mut license = License {
            license_type: LicenseType::Subscription,
            tier,
            expires_at,
            watermark: issue_watermark("user-1"),
            signature: String::new(),
            key_id: "k1".to_string(),
        };
        let signature = signing_key.sign(signing_payload(&license).as_bytes());
        license.signature = BASE64.encode(signature.to_bytes());
        license
    }

    fn key_record(public_b64: &str) -> PublicKeyRecord {
        PublicKeyRecord {
            key_id: "k1".to_string(),
            algorithm: "ed25519".to_string(),
            public_key_pem: public_b64.to_string(),
            expires_at: None,
        }
    }

    #[test]
    fn tier_order_is_total_and_reflexive() {
        let tiers = [Tier::Free, Tier::Pro, Tier::Team, Tier::Enterprise];
        for t in tiers {
            assert!(t.satisfies(t));
            assert!(Tier::Enterprise.satisfies(t));
        }
        for t in [Tier::Pro, Tier::Team, Tier::Enterprise] {
            assert!(!Tier::Free.satisfies(t));
        }
        assert!(Tier::Team.satisfies(Tier::Pro));
        assert!(!Tier::Pro.satisfies(Tier::Team));
    }

    #[test]
    fn valid_license_passes() {
        let (signing_key, public_b64) = test_key();
        let license = signed_license(&signing_key, Tier::Pro, None);
        validate(&license, &key_record(&public_b64), "pkg", Tier::Pro).expect("valid");
    }

    #[test]
    fn tampered_license_fails_signature_check() {
        let (signing_key, public_b64) = test_key();
        let mut license = signed_license(&signing_key, Tier::Pro, None);
        license.tier = Tier::Enterprise;

        let err = validate(&license, &key_record(&public_b64), "pkg", Tier::Free).unwrap_err();
        assert!(matches!(err, RegistryError::Signature(_)), "got {:?}", err);
    }

    #[test]
    fn expired_license_reports_expiry_not_signature() {
        let (signing_key, public_b64) = test_key();
        let past = Utc::now() - Duration::hours(1);
        let license = signed_license(&signing_key, Tier::Pro, Some(past));

        let err = validate(&license, &key_record(&public_b64), "pkg", Tier::Free).unwrap_err();
        assert!(matches!(err, RegistryError::LicenseExpired(_)), "got {:?}", err);
    }

    #[test]
    fn insufficient_tier_reports_both_tiers() {
        let (signing_key, public_b64) = test_key();
        let license = signed_license(&signing_key, Tier::Free, None);

        let err = validate(&license, &key_record(&public_b64), "pkg", Tier::Team).unwrap_err();
        match err {
            RegistryError::TierInsufficient { required, current, .. } => {
                assert_eq!(required, Tier::Team);
                assert_eq!(current, Tier::Free);
            }
            other => panic!("expected TierInsufficient, got {:?}", other),
        }
    }

    #[test]
    fn expired_signing_key_is_rejected_even_with_valid_signature() {
        let (signing_key, public_b64) = test_key();
        let license = signed_license(&signing_key, Tier::Pro, None);

        let mut key = key_record(&public_b64);
        key.expires_at = Some(Utc::now() - Duration::minutes(5));

        let err = validate(&license, &key, "pkg", Tier::Free).unwrap_err();
        assert!(matches!(err, RegistryError::Signature(_)));
    }

    #[test]
    fn pem_armored_key_decodes() {
        let (signing_key, public_b64) = test_key();
        let pem = format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            public_b64
        );
        let decoded = decode_verifying_key(&pem).expect("pem decodes");
        assert_eq!(decoded.to_bytes(), signing_key.verifying_key().to_bytes());
    }

    #[test]
    fn watermarks_are_unique_per_issuance() {
        let a = issue_watermark("user-1");
        let b = issue_watermark("user-1");
        assert_ne!(a, b);
        assert!(a.starts_with("user-1-"));
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Enterprise).unwrap(), "\"enterprise\"");
        let t: Tier = serde_json::from_str("\"pro\"").unwrap();
        assert_eq!(t, Tier::Pro);
    }
}
