//! Content hashing for integrity markers

use sha2::{Digest as _, Sha256};

/// Number of hex characters kept from the SHA-256 digest. Enough for tamper
/// detection while keeping markers short.
const DIGEST_HEX_LEN: usize = 16;

/// Compute the short content digest: first 16 hex chars of SHA-256.
///
/// Deterministic and side-effect free. The threat model is tamper
/// *detection* of locally installed files, not commitment against an
/// adversary who controls both plaintext and hash.
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut hex = format!("{:x}", digest);
    hex.truncate(DIGEST_HEX_LEN);
    hex
}
