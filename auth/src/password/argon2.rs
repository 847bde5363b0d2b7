use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher as Argon2PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::Argon2;

use super::errors::PasswordError;

static DECOY_HASH: OnceLock<String> = OnceLock::new();

/// Password hashing implementation (Argon2id, PHC string format).
///
/// Verification goes through the Argon2 verifier, which compares digests
/// in constant time.
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash a plaintext password with a random salt.
    ///
    /// # Errors
    /// * `HashingFailed` - Password hashing operation failed
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Verify a password against a stored hash.
    ///
    /// # Returns
    /// True if password matches, false otherwise
    ///
    /// # Errors
    /// * `VerificationFailed` - Stored hash is not a valid PHC string
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            PasswordError::VerificationFailed(format!("Invalid password hash: {}", e))
        })?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Run a full verification against a throwaway hash and discard the result.
    ///
    /// Used when no stored hash exists (unknown or inactive account) so the
    /// failure path costs the same as a wrong password.
    ///
    /// # Errors
    /// * `HashingFailed` - The throwaway hash could not be built
    /// * `VerificationFailed` - The throwaway hash did not parse
    pub fn verify_decoy(&self, password: &str) -> Result<(), PasswordError> {
        let decoy = match DECOY_HASH.get() {
            Some(decoy) => decoy,
            None => {
                let decoy = self.hash("decoy-password-never-matches")?;
                DECOY_HASH.get_or_init(|| decoy)
            }
        };

        let parsed_hash = PasswordHash::new(decoy).map_err(|e| {
            PasswordError::VerificationFailed(format!("Invalid decoy hash: {}", e))
        })?;
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);

        Ok(())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
