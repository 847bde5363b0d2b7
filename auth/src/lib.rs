//! Authentication primitives for the session service.
//!
//! - Password hashing (Argon2id)
//! - Session token codec (HS256 JWT with issuer/audience/type checks)
//! - SHA-256 digests and random secrets for stored refresh/reset values
//! - An [`Authenticator`] bundling the above with token lifetimes
//!
//! Everything here is stateless; session validity is the caller's concern.
//!
//! # Examples
//!
//! ```
//! use auth::{Authenticator, TokenLifetimes};
//!
//! let auth = Authenticator::new(
//!     b"secret_key_at_least_32_bytes_long!",
//!     "session-service",
//!     "platform",
//!     TokenLifetimes::default(),
//! );
//!
//! let hash = auth.hash_password("password123").unwrap();
//! assert!(auth.verify_password("password123", &hash).unwrap());
//!
//! let pair = auth.issue_pair("user123", "session456", "student").unwrap();
//! let claims = auth.verify_access_token(&pair.access_token).unwrap();
//! assert_eq!(claims.sid, "session456");
//!
//! let stored = auth::digest::sha256_hex(&pair.refresh_token);
//! assert_eq!(stored.len(), 64);
//! ```

pub mod authenticator;
pub mod digest;
pub mod jwt;
pub mod password;

pub use authenticator::Authenticator;
pub use authenticator::TokenLifetimes;
pub use authenticator::TokenPair;
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtHandler;
pub use jwt::TokenType;
pub use password::PasswordError;
pub use password::PasswordHasher;
