use thiserror::Error;

/// Error type for JWT operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingFailed(String),

    #[error("Failed to decode token: {0}")]
    DecodingFailed(String),

    #[error("Token is expired")]
    TokenExpired,

    #[error("Token is invalid: {0}")]
    InvalidToken(String),

    #[error("Unexpected token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: String, actual: String },
}

impl JwtError {
    /// Whether the failure is an elapsed expiry on an otherwise valid token.
    pub fn is_expired(&self) -> bool {
        matches!(self, JwtError::TokenExpired)
    }
}
