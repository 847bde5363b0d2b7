use std::sync::Arc;

use async_trait::async_trait;
use auth::digest;
use auth::Authenticator;
use auth::TokenPair;
use chrono::Utc;

use crate::errors::AuthError;
use crate::session::models::expiry_from_timestamp;
use crate::session::models::EmailMessage;
use crate::session::models::LoginCommand;
use crate::session::models::LoginOutcome;
use crate::session::models::Session;
use crate::session::models::SessionClaims;
use crate::session::models::SessionId;
use crate::session::models::SessionPolicy;
use crate::session::models::SessionSummary;
use crate::session::models::PENDING_TOKEN_HASH;
use crate::session::ports::EmailSender;
use crate::session::ports::SessionRepository;
use crate::session::ports::SessionServicePort;
use crate::user::models::EmailAddress;
use crate::user::models::User;
use crate::user::models::UserId;
use crate::user::models::UserProfile;
use crate::user::ports::UserRepository;

/// Domain service implementing login, token rotation and session checks.
///
/// Revocation and password flows live in sibling modules as further
/// `impl` blocks on the same type.
pub struct SessionService<UR, SR, ES>
where
    UR: UserRepository,
    SR: SessionRepository,
    ES: EmailSender,
{
    pub(super) users: Arc<UR>,
    pub(super) sessions: Arc<SR>,
    pub(super) email_sender: Arc<ES>,
    pub(super) authenticator: Arc<Authenticator>,
    pub(super) policy: SessionPolicy,
}

impl<UR, SR, ES> SessionService<UR, SR, ES>
where
    UR: UserRepository,
    SR: SessionRepository,
    ES: EmailSender,
{
    /// Create a new session service with injected dependencies.
    ///
    /// # Arguments
    /// * `users` - User store
    /// * `sessions` - Session store (must honour the compare-and-swap contract)
    /// * `email_sender` - Outbound email
    /// * `authenticator` - Token codec and password hasher
    /// * `policy` - Grace window, reset and password policy settings
    pub fn new(
        users: Arc<UR>,
        sessions: Arc<SR>,
        email_sender: Arc<ES>,
        authenticator: Arc<Authenticator>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            email_sender,
            authenticator,
            policy,
        }
    }

    /// Check email and password against the stored hash.
    ///
    /// Unknown and inactive accounts still pay for a password verification so
    /// the three failure causes are indistinguishable.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email, inactive account or wrong password
    pub async fn verify_credentials(
        &self,
        email: &EmailAddress,
        password: &str,
    ) -> Result<User, AuthError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.authenticator.verify_decoy_password(password)?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self
            .authenticator
            .verify_password(password, &user.password_hash)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Load a session that is neither revoked nor expired.
    async fn load_active_session(&self, id: &SessionId) -> Result<Session, AuthError> {
        let now = Utc::now();

        self.sessions
            .find_by_id(id)
            .await?
            .filter(|session| session.is_active(now))
            .ok_or(AuthError::SessionRevoked)
    }

    /// Send an email whose failure must not affect the calling operation.
    pub(super) async fn send_best_effort(&self, message: EmailMessage, purpose: &str) {
        if let Err(e) = self.email_sender.send(&message).await {
            tracing::warn!(purpose = purpose, error = %e, "Notification email not delivered");
        }
    }
}

#[async_trait]
impl<UR, SR, ES> SessionServicePort for SessionService<UR, SR, ES>
where
    UR: UserRepository,
    SR: SessionRepository,
    ES: EmailSender,
{
    async fn login(&self, command: LoginCommand) -> Result<LoginOutcome, AuthError> {
        let user = self
            .verify_credentials(&command.email, &command.password)
            .await?;

        let now = Utc::now();
        let expires_at = now + self.authenticator.lifetimes().refresh;
        let session = self
            .sessions
            .create(Session::new(user.id, command.audit, expires_at))
            .await?;

        // The refresh token embeds the session id, so the real hash can only
        // be written once the session exists.
        let tokens = self
            .authenticator
            .issue_pair(user.id, session.id, user.role)?;
        let swapped = self
            .sessions
            .compare_and_swap_token_hash(
                &session.id,
                PENDING_TOKEN_HASH,
                &digest::sha256_hex(&tokens.refresh_token),
                expiry_from_timestamp(tokens.refresh_expires_at),
                now,
            )
            .await?;
        if !swapped {
            return Err(AuthError::Unknown(format!(
                "Session {} changed before its first token was stored",
                session.id
            )));
        }

        if let Err(e) = self.users.record_login(&user.id, now).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to record login time");
        }

        if self.policy.notify_on_login {
            let message = EmailMessage {
                to: user.email.to_string(),
                subject: "New sign-in to your account".to_string(),
                body: format!(
                    "A new sign-in to your account was recorded at {}.\n\n\
                     Device: {}\nIP address: {}\n\n\
                     If this was not you, reset your password immediately.",
                    now.to_rfc2822(),
                    session.audit.user_agent.as_deref().unwrap_or("unknown"),
                    session.audit.ip_address.as_deref().unwrap_or("unknown"),
                ),
            };
            self.send_best_effort(message, "login_notification").await;
        }

        tracing::info!(user_id = %user.id, session_id = %session.id, "Session opened");

        let mut profile = UserProfile::from(&user);
        profile.last_login_at = Some(now);

        Ok(LoginOutcome {
            user: profile,
            session_id: session.id,
            tokens,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.authenticator.verify_refresh_token(refresh_token)?;
        let session_id = SessionId::from_string(&claims.sid)
            .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;

        let session = self.load_active_session(&session_id).await?;
        if session.user_id.to_string() != claims.sub {
            return Err(AuthError::TokenInvalid(
                "Token subject does not own the session".to_string(),
            ));
        }

        let now = Utc::now();
        let presented_hash = digest::sha256_hex(refresh_token);

        if presented_hash != session.refresh_token_hash {
            if session.is_recent_predecessor(&presented_hash, now, self.policy.refresh_reuse_grace)
            {
                tracing::info!(
                    session_id = %session_id,
                    "Superseded refresh token presented within grace window"
                );
                return Err(AuthError::RotationConflict);
            }

            if self
                .sessions
                .revoke_on_reuse(&session_id, &presented_hash)
                .await?
            {
                tracing::warn!(
                    user_id = %session.user_id,
                    session_id = %session_id,
                    "Refresh token reuse detected, session revoked"
                );
                return Err(AuthError::ReuseDetected);
            }

            return Err(AuthError::RotationConflict);
        }

        let user = match self.users.find_by_id(&session.user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.sessions.revoke(&session_id).await?;
                tracing::warn!(
                    user_id = %session.user_id,
                    session_id = %session_id,
                    "Refresh for missing or inactive user, session revoked"
                );
                return Err(AuthError::SessionRevoked);
            }
        };

        let tokens = self
            .authenticator
            .issue_pair(user.id, session_id, user.role)?;
        let swapped = self
            .sessions
            .compare_and_swap_token_hash(
                &session_id,
                &presented_hash,
                &digest::sha256_hex(&tokens.refresh_token),
                expiry_from_timestamp(tokens.refresh_expires_at),
                now,
            )
            .await?;

        if !swapped {
            // Either a concurrent rotation won or the session was revoked in between.
            let still_active = self
                .sessions
                .find_by_id(&session_id)
                .await?
                .is_some_and(|s| s.is_active(Utc::now()));
            if !still_active {
                return Err(AuthError::SessionRevoked);
            }

            tracing::info!(session_id = %session_id, "Lost concurrent rotation race");
            return Err(AuthError::RotationConflict);
        }

        tracing::debug!(session_id = %session_id, "Refresh token rotated");

        Ok(tokens)
    }

    async fn logout(&self, session_id: &SessionId) -> Result<(), AuthError> {
        self.revoke_one(session_id).await
    }

    async fn get_session_claims(&self, access_token: &str) -> Result<SessionClaims, AuthError> {
        let claims = self.authenticator.verify_access_token(access_token)?;
        let session_id = SessionId::from_string(&claims.sid)
            .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;
        let user_id =
            UserId::from_string(&claims.sub).map_err(|e| AuthError::TokenInvalid(e.to_string()))?;

        let session = self.load_active_session(&session_id).await?;
        if session.user_id != user_id {
            return Err(AuthError::SessionRevoked);
        }

        Ok(SessionClaims {
            user_id,
            session_id,
            role: claims.role.as_deref().and_then(|r| r.parse().ok()),
            expires_at: expiry_from_timestamp(claims.exp),
        })
    }

    async fn list_sessions(
        &self,
        user_id: &UserId,
        current_session_id: &SessionId,
    ) -> Result<Vec<SessionSummary>, AuthError> {
        let sessions = self
            .sessions
            .list_active_for_user(user_id, Utc::now())
            .await?;

        Ok(sessions
            .iter()
            .map(|session| SessionSummary::from_session(session, current_session_id))
            .collect())
    }

    async fn revoke_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<(), AuthError> {
        self.revoke_owned(user_id, session_id).await
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.request_reset(email).await;
        Ok(())
    }

    async fn redeem_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.redeem_reset(token, new_password).await
    }

    async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: &str,
        current_session_id: &SessionId,
    ) -> Result<(), AuthError> {
        self.change_password_keeping_session(
            user_id,
            current_password,
            new_password,
            current_session_id,
        )
        .await
    }

    async fn on_account_deactivation(&self, user_id: &UserId) -> Result<u64, AuthError> {
        self.revoke_for_deactivation(user_id).await
    }
}
