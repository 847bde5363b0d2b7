use auth::JwtError;
use auth::PasswordError;
use thiserror::Error;

use crate::session::errors::SessionIdError;
use crate::user::errors::EmailError;
use crate::user::errors::PasswordPolicyError;
use crate::user::errors::RoleError;
use crate::user::errors::UserIdError;

/// Error for outbound email delivery.
///
/// Distinguishes "not sent" from "sent" so the reset flow can roll back.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailDeliveryError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    BuildFailed(String),

    #[error("Failed to deliver message: {0}")]
    DeliveryFailed(String),
}

/// Top-level error for all session and credential operations.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // Protocol errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Refresh token reuse detected")]
    ReuseDetected,

    #[error("Concurrent token rotation, retry with the latest refresh token")]
    RotationConflict,

    #[error("Reset token invalid or expired")]
    ResetTokenInvalid,

    // Validation errors (automatically converted via #[from])
    #[error("Invalid user ID: {0}")]
    InvalidUserId(#[from] UserIdError),

    #[error("Invalid session ID: {0}")]
    InvalidSessionId(#[from] SessionIdError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid role: {0}")]
    InvalidRole(#[from] RoleError),

    #[error("Password policy: {0}")]
    WeakPassword(#[from] PasswordPolicyError),

    // Infrastructure errors
    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Email delivery error: {0}")]
    EmailDelivery(#[from] EmailDeliveryError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Malformed input, the caller can fix and resubmit.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidUserId(_)
                | AuthError::InvalidSessionId(_)
                | AuthError::InvalidEmail(_)
                | AuthError::InvalidRole(_)
                | AuthError::WeakPassword(_)
        )
    }

    /// Safe for the caller to retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::RotationConflict)
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenExpired => AuthError::TokenExpired,
            JwtError::EncodingFailed(msg) => {
                AuthError::Unknown(format!("Token generation failed: {}", msg))
            }
            JwtError::DecodingFailed(msg) | JwtError::InvalidToken(msg) => {
                AuthError::TokenInvalid(msg)
            }
            JwtError::WrongTokenType { expected, actual } => AuthError::TokenInvalid(format!(
                "expected {} token, got {}",
                expected, actual
            )),
        }
    }
}
