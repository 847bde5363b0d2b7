use async_trait::async_trait;
use auth::TokenPair;
use chrono::DateTime;
use chrono::Utc;

use crate::errors::AuthError;
use crate::errors::EmailDeliveryError;
use crate::session::models::EmailMessage;
use crate::session::models::LoginCommand;
use crate::session::models::LoginOutcome;
use crate::session::models::Session;
use crate::session::models::SessionClaims;
use crate::session::models::SessionId;
use crate::session::models::SessionSummary;
use crate::user::models::UserId;

/// Port for session lifecycle operations exposed to the API layer.
#[async_trait]
pub trait SessionServicePort: Send + Sync + 'static {
    /// Verify credentials, open a session and issue its first token pair.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email, inactive account or wrong password
    /// * `DatabaseError` - Database operation failed
    async fn login(&self, command: LoginCommand) -> Result<LoginOutcome, AuthError>;

    /// Exchange a refresh token for a new pair, invalidating the presented one.
    ///
    /// # Errors
    /// * `TokenExpired` / `TokenInvalid` - Presented token failed verification
    /// * `SessionRevoked` - Session missing, expired, revoked or user inactive
    /// * `ReuseDetected` - Token was already rotated away; the session is now revoked
    /// * `RotationConflict` - Lost a concurrent rotation race; safe to retry
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Revoke exactly one session. Idempotent.
    async fn logout(&self, session_id: &SessionId) -> Result<(), AuthError>;

    /// Verify an access token and confirm its session is still live.
    ///
    /// # Errors
    /// * `TokenExpired` / `TokenInvalid` - Token failed verification
    /// * `SessionRevoked` - Session missing, expired or revoked
    async fn get_session_claims(&self, access_token: &str) -> Result<SessionClaims, AuthError>;

    /// List a user's live sessions, newest first.
    async fn list_sessions(
        &self,
        user_id: &UserId,
        current_session_id: &SessionId,
    ) -> Result<Vec<SessionSummary>, AuthError>;

    /// Revoke one of the user's own sessions.
    ///
    /// # Errors
    /// * `SessionRevoked` - No such session owned by this user
    async fn revoke_session(&self, user_id: &UserId, session_id: &SessionId)
        -> Result<(), AuthError>;

    /// Start a password reset. Always succeeds with the same outcome whether
    /// or not the account exists.
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Redeem a reset secret, set a new password and revoke every session.
    ///
    /// # Errors
    /// * `ResetTokenInvalid` - Secret unknown, already used or expired
    /// * `WeakPassword` - New password fails the policy
    async fn redeem_password_reset(&self, token: &str, new_password: &str)
        -> Result<(), AuthError>;

    /// Change password for a logged-in user, keeping only the current session.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Current password does not match
    /// * `WeakPassword` - New password fails the policy
    async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: &str,
        current_session_id: &SessionId,
    ) -> Result<(), AuthError>;

    /// Revoke every session of a deactivated account.
    ///
    /// # Returns
    /// Number of sessions that changed state
    async fn on_account_deactivation(&self, user_id: &UserId) -> Result<u64, AuthError>;
}

/// Persistence for sessions.
///
/// Implementations must be correct across several server instances sharing
/// one store: the conditional operations below are single atomic store
/// operations, never read-then-write sequences.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Persist a new session.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn create(&self, session: Session) -> Result<Session, AuthError>;

    /// Retrieve session by identifier, revoked or expired ones included.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, AuthError>;

    /// Non-revoked, unexpired sessions of a user, newest first.
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn list_active_for_user(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, AuthError>;

    /// Compare-and-swap the refresh-token hash.
    ///
    /// Sets `refresh_token_hash = new_hash`, `previous_token_hash =
    /// expected_hash`, `rotated_at = now` and `expires_at` only if the
    /// session is live and its current hash equals `expected_hash`.
    ///
    /// # Returns
    /// True if this call performed the swap
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn compare_and_swap_token_hash(
        &self,
        id: &SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Revoke the session if its current hash differs from `presented_hash`.
    ///
    /// The mismatch check and the revocation are one transition.
    ///
    /// # Returns
    /// True if the hash differed (session is now revoked)
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn revoke_on_reuse(&self, id: &SessionId, presented_hash: &str)
        -> Result<bool, AuthError>;

    /// Mark one session revoked. Idempotent.
    ///
    /// # Returns
    /// True if the session changed state
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn revoke(&self, id: &SessionId) -> Result<bool, AuthError>;

    /// Mark every session of a user revoked, optionally sparing one.
    ///
    /// # Returns
    /// Number of sessions that changed state
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        except: Option<&SessionId>,
    ) -> Result<u64, AuthError>;

    /// Erase sessions whose `expires_at` has passed.
    ///
    /// # Returns
    /// Number of sessions erased
    ///
    /// # Errors
    /// * `DatabaseError` - Database operation failed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}

/// Outbound email delivery.
#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    /// Deliver one message.
    ///
    /// # Errors
    /// * `InvalidAddress` - Recipient or sender address rejected
    /// * `BuildFailed` - Message could not be assembled
    /// * `DeliveryFailed` - Transport refused or failed to deliver
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailDeliveryError>;
}
