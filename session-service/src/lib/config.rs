use std::env;

use auth::TokenLifetimes;
use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::domain::session::models::SessionPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub password_reset: PasswordResetConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Window in which re-presenting the immediately-prior refresh token is
    /// reported as a retryable conflict instead of a replay. 0 disables it.
    pub refresh_reuse_grace_secs: i64,
    pub expiry_sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PasswordResetConfig {
    pub token_ttl_secs: i64,
    /// Minimum wall time of a reset request, whether or not the account exists.
    pub response_floor_ms: u64,
    pub min_password_length: usize,
    pub reset_url_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
    pub notify_on_login: bool,
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (DATABASE__URL, JWT__SECRET, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let configuration = ConfigBuilder::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Example: JWT__SECRET=... overrides jwt.secret
            .add_source(Environment::with_prefix("").separator("__"))
            .build()?;

        let config: Config = configuration.try_deserialize()?;

        if config.jwt.secret.len() < 32 {
            return Err(ConfigError::Message(
                "jwt.secret must be at least 32 bytes".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn token_lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: chrono::Duration::seconds(self.jwt.access_token_ttl_secs),
            refresh: chrono::Duration::seconds(self.jwt.refresh_token_ttl_secs),
        }
    }

    /// Service-level knobs handed to the domain layer.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            refresh_reuse_grace: chrono::Duration::seconds(self.session.refresh_reuse_grace_secs),
            reset_token_ttl: chrono::Duration::seconds(self.password_reset.token_ttl_secs),
            reset_response_floor: std::time::Duration::from_millis(
                self.password_reset.response_floor_ms,
            ),
            min_password_length: self.password_reset.min_password_length,
            reset_url_base: self.password_reset.reset_url_base.clone(),
            notify_on_login: self.email.notify_on_login,
        }
    }
}
