use chrono::Duration;

use crate::jwt::Claims;
use crate::jwt::JwtError;
use crate::jwt::JwtHandler;
use crate::jwt::TokenType;
use crate::password::PasswordError;
use crate::password::PasswordHasher;

/// Lifetimes applied to freshly minted tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(15),
            refresh: Duration::days(7),
        }
    }
}

/// A freshly minted access/refresh pair bound to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp
    pub access_expires_at: i64,
    /// Unix timestamp
    pub refresh_expires_at: i64,
}

/// Authentication coordinator combining password hashing and token handling.
pub struct Authenticator {
    password_hasher: PasswordHasher,
    jwt_handler: JwtHandler,
    lifetimes: TokenLifetimes,
}

impl Authenticator {
    /// Create a new authenticator.
    ///
    /// # Arguments
    /// * `jwt_secret` - Secret key for token signing
    /// * `issuer` - Issuer tag stamped into and required from every token
    /// * `audience` - Audience tag stamped into and required from every token
    /// * `lifetimes` - Access and refresh token lifetimes
    pub fn new(
        jwt_secret: &[u8],
        issuer: impl ToString,
        audience: impl ToString,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            password_hasher: PasswordHasher::new(),
            jwt_handler: JwtHandler::new(jwt_secret, issuer, audience),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Hash a password for storage.
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        self.password_hasher.hash(password)
    }

    /// Compare a plaintext password with a stored hash.
    pub fn verify_password(
        &self,
        password: &str,
        stored_hash: &str,
    ) -> Result<bool, PasswordError> {
        self.password_hasher.verify(password, stored_hash)
    }

    /// Spend the cost of a verification when there is no hash to compare with.
    pub fn verify_decoy_password(&self, password: &str) -> Result<(), PasswordError> {
        self.password_hasher.verify_decoy(password)
    }

    /// Mint an access and a refresh token for one session.
    ///
    /// # Arguments
    /// * `subject` - User identifier
    /// * `session_id` - Session both tokens are bound to
    /// * `role` - Authorization hint carried by the access token only
    ///
    /// # Errors
    /// * `EncodingFailed` - Token generation failed
    pub fn issue_pair(
        &self,
        subject: impl ToString,
        session_id: impl ToString,
        role: impl ToString,
    ) -> Result<TokenPair, JwtError> {
        let subject = subject.to_string();
        let session_id = session_id.to_string();

        let access_claims = Claims::new(
            &subject,
            &session_id,
            TokenType::Access,
            self.lifetimes.access,
        )
        .with_role(role);
        let access_expires_at = access_claims.exp;

        let refresh_claims = Claims::new(
            &subject,
            &session_id,
            TokenType::Refresh,
            self.lifetimes.refresh,
        );
        let refresh_expires_at = refresh_claims.exp;

        Ok(TokenPair {
            access_token: self.jwt_handler.encode(access_claims)?,
            refresh_token: self.jwt_handler.encode(refresh_claims)?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate an access token and return its claims.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.jwt_handler.decode_typed(token, TokenType::Access)
    }

    /// Validate a refresh token and return its claims.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.jwt_handler.decode_typed(token, TokenType::Refresh)
    }
}
