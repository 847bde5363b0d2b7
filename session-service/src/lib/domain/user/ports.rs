use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

use crate::errors::AuthError;
use crate::user::models::EmailAddress;
use crate::user::models::User;
use crate::user::models::UserId;

/// User store consumed by the session core.
///
/// The user record is owned elsewhere; only the password hash, reset
/// secret and login timestamp are written through this port.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Retrieve user by identifier.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, AuthError>;

    /// Retrieve user by (normalised) email address.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, AuthError>;

    /// Replace the password hash and bump `password_changed_at`.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed or user does not exist
    async fn update_password_hash(
        &self,
        id: &UserId,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Store a reset-secret digest and its expiry, replacing any previous one.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn set_reset_secret(
        &self,
        id: &UserId,
        secret_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Clear the reset secret, but only while it is still `secret_hash`.
    ///
    /// A newer secret issued in the meantime is left alone.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn clear_reset_secret(&self, id: &UserId, secret_hash: &str) -> Result<(), AuthError>;

    /// Active user holding a reset secret that matches `secret_hash` and has
    /// not expired at `now`. Reads only; the secret stays redeemable.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_reset_secret(
        &self,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AuthError>;

    /// Atomically clear a live reset secret matching `secret_hash` and store
    /// `password_hash` in the same write.
    ///
    /// Exactly one of several concurrent callers presenting the same secret
    /// gets the user id back. Either both the secret and the password change
    /// or neither does.
    ///
    /// # Returns
    /// Owner of the redeemed secret, or None if no live secret matched
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn redeem_reset_secret(
        &self,
        secret_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, AuthError>;

    /// Record a successful login.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), AuthError>;
}
