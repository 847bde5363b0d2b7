//! One-way digests and random secrets.
//!
//! Refresh tokens and password-reset secrets are never stored in clear; the
//! store only sees their SHA-256 digest.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

/// Number of random bytes in a generated secret (256 bits).
pub const SECRET_BYTES: usize = 32;

/// SHA-256 of `value`, hex encoded.
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a high-entropy secret from the OS RNG, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
