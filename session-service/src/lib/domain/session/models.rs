use std::fmt;

use auth::TokenPair;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use uuid::Uuid;

use crate::session::errors::SessionIdError;
use crate::user::models::EmailAddress;
use crate::user::models::Role;
use crate::user::models::UserId;
use crate::user::models::UserProfile;

/// Stored in place of a refresh-token hash between session creation and the
/// first token being minted. Never equal to a SHA-256 hex digest.
pub const PENDING_TOKEN_HASH: &str = "pending";

/// Session unique identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from string.
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self, SessionIdError> {
        Uuid::parse_str(s)
            .map(SessionId)
            .map_err(|e| SessionIdError::InvalidFormat(e.to_string()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque client metadata recorded for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Server-side record anchoring one login.
///
/// A live session has exactly one refresh-token hash that verifies; any
/// other refresh token carrying this session's id is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub refresh_token_hash: String,
    /// Hash replaced by the most recent rotation
    pub previous_token_hash: Option<String>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub audit: AuditInfo,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// New session awaiting its first refresh token.
    pub fn new(user_id: UserId, audit: AuditInfo, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            refresh_token_hash: PENDING_TOKEN_HASH.to_string(),
            previous_token_hash: None,
            rotated_at: None,
            is_revoked: false,
            expires_at,
            audit,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Neither revoked nor expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    /// Whether `presented_hash` is the token rotated away less than `grace` ago.
    ///
    /// Always false when `grace` is zero.
    pub fn is_recent_predecessor(
        &self,
        presented_hash: &str,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> bool {
        if grace <= Duration::zero() {
            return false;
        }

        match (&self.previous_token_hash, self.rotated_at) {
            (Some(previous), Some(rotated_at)) => {
                previous == presented_hash && now - rotated_at < grace
            }
            _ => false,
        }
    }
}

/// Login input.
#[derive(Debug, Clone)]
pub struct LoginCommand {
    pub email: EmailAddress,
    pub password: String,
    pub audit: AuditInfo,
}

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub session_id: SessionId,
    pub tokens: TokenPair,
}

/// Verified identity of a request bearing an access token whose session is
/// still live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    pub session_id: SessionId,
    /// Role at token issue time; authorization hint only
    pub role: Option<Role>,
    pub expires_at: DateTime<Utc>,
}

/// Audit view of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionSummary {
    pub fn from_session(session: &Session, current: &SessionId) -> Self {
        Self {
            id: session.id,
            user_agent: session.audit.user_agent.clone(),
            ip_address: session.audit.ip_address.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            is_current: &session.id == current,
        }
    }
}

/// Email handed to the delivery port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Tunables for the session core.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Window in which the immediately-prior refresh token yields
    /// `RotationConflict` instead of `ReuseDetected`. Zero is strict.
    pub refresh_reuse_grace: Duration,
    pub reset_token_ttl: Duration,
    /// Minimum wall time of every reset request.
    pub reset_response_floor: std::time::Duration,
    pub min_password_length: usize,
    pub reset_url_base: String,
    pub notify_on_login: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            refresh_reuse_grace: Duration::zero(),
            reset_token_ttl: Duration::minutes(15),
            reset_response_floor: std::time::Duration::from_millis(400),
            min_password_length: 8,
            reset_url_base: "http://localhost:3000/reset-password".to_string(),
            notify_on_login: false,
        }
    }
}

/// Convert a token expiry (Unix seconds) to a timestamp.
pub fn expiry_from_timestamp(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now)
}
