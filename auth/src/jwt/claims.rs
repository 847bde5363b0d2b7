use std::fmt;

use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Purpose a token was minted for.
///
/// Access and refresh tokens share a signing key, so the type is part of the
/// signed payload and checked on every verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session token claims.
///
/// Standard RFC 7519 fields plus the session binding (`sid`), the token
/// purpose (`typ`) and, for access tokens, an authorization hint (`role`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,

    /// Session the token is bound to
    pub sid: String,

    /// Token purpose
    pub typ: TokenType,

    /// Role at issue time (access tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: String,

    /// JWT ID, unique per minted token
    pub jti: String,
}

impl Claims {
    /// Create claims for a session token issued now.
    ///
    /// # Arguments
    /// * `subject` - User identifier
    /// * `session_id` - Session the token is bound to
    /// * `token_type` - Access or refresh
    /// * `ttl` - Lifetime from now
    ///
    /// # Returns
    /// Claims with sub, sid, typ, iat, exp and a fresh jti set.
    /// Issuer and audience are empty until set with the builder methods.
    pub fn new(
        subject: impl ToString,
        session_id: impl ToString,
        token_type: TokenType,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: subject.to_string(),
            sid: session_id.to_string(),
            typ: token_type,
            role: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: String::new(),
            aud: String::new(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Set role.
    pub fn with_role(mut self, role: impl ToString) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Set issuer.
    pub fn with_issuer(mut self, iss: impl ToString) -> Self {
        self.iss = iss.to_string();
        self
    }

    /// Set audience.
    pub fn with_audience(mut self, aud: impl ToString) -> Self {
        self.aud = aud.to_string();
        self
    }

    /// Set expiration (Unix timestamp).
    pub fn with_expiration(mut self, exp: i64) -> Self {
        self.exp = exp;
        self
    }

    /// Check if token is expired.
    pub fn is_expired(&self, current_timestamp: i64) -> bool {
        self.exp < current_timestamp
    }
}
