use std::sync::Arc;

use auth::digest;
use chrono::Utc;
use tokio::time::Instant;

use crate::errors::AuthError;
use crate::session::models::EmailMessage;
use crate::session::models::SessionId;
use crate::session::ports::EmailSender;
use crate::session::ports::SessionRepository;
use crate::session::service::SessionService;
use crate::user::models::EmailAddress;
use crate::user::models::NewPassword;
use crate::user::models::UserId;
use crate::user::ports::UserRepository;

/// A stored reset secret whose email still has to go out.
struct PendingResetEmail {
    user_id: UserId,
    secret_hash: String,
    message: EmailMessage,
}

impl<UR, SR, ES> SessionService<UR, SR, ES>
where
    UR: UserRepository,
    SR: SessionRepository,
    ES: EmailSender,
{
    /// Start a password reset for `email`.
    ///
    /// Never reports an outcome. Every call, for existing and unknown
    /// accounts alike, takes at least `reset_response_floor`. Delivery runs
    /// in a detached task, so mail latency never shows in the response time.
    pub async fn request_reset(&self, email: &str) {
        let started = Instant::now();

        match self.issue_reset_secret(email).await {
            Ok(Some(pending)) => self.spawn_reset_delivery(pending),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Password reset request failed"),
        }

        let floor = self.policy.reset_response_floor;
        let elapsed = started.elapsed();
        if elapsed < floor {
            tokio::time::sleep(floor - elapsed).await;
        }
    }

    async fn issue_reset_secret(
        &self,
        email: &str,
    ) -> Result<Option<PendingResetEmail>, AuthError> {
        let Ok(email) = EmailAddress::new(email.to_string()) else {
            return Ok(None);
        };

        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::debug!("Password reset requested for unknown or inactive account");
                return Ok(None);
            }
        };

        let secret = digest::generate_secret();
        let secret_hash = digest::sha256_hex(&secret);
        let expires_at = Utc::now() + self.policy.reset_token_ttl;
        self.users
            .set_reset_secret(&user.id, &secret_hash, expires_at)
            .await?;

        let message = EmailMessage {
            to: user.email.to_string(),
            subject: "Password reset request".to_string(),
            body: format!(
                "You requested to reset your password.\n\n\
                 Use the link below to choose a new one:\n{}?token={}\n\n\
                 This link expires in {} minutes and can be used once.\n\n\
                 If you did not request this, you can ignore this email.",
                self.policy.reset_url_base,
                secret,
                self.policy.reset_token_ttl.num_minutes(),
            ),
        };

        tracing::info!(user_id = %user.id, "Password reset secret issued");
        Ok(Some(PendingResetEmail {
            user_id: user.id,
            secret_hash,
            message,
        }))
    }

    fn spawn_reset_delivery(&self, pending: PendingResetEmail) {
        let users = Arc::clone(&self.users);
        let email_sender = Arc::clone(&self.email_sender);

        tokio::spawn(async move {
            let PendingResetEmail {
                user_id,
                secret_hash,
                message,
            } = pending;

            let Err(e) = email_sender.send(&message).await else {
                tracing::debug!(user_id = %user_id, "Password reset email delivered");
                return;
            };
            tracing::error!(user_id = %user_id, error = %e, "Password reset email not delivered");

            // The secret must not stay redeemable if it never reached the user.
            if let Err(rollback) = users.clear_reset_secret(&user_id, &secret_hash).await {
                tracing::error!(
                    user_id = %user_id,
                    error = %rollback,
                    "Failed to roll back reset secret after delivery failure"
                );
            }
        });
    }

    /// Redeem a reset secret: set the new password and revoke every session.
    ///
    /// Sessions are revoked before the secret is spent, and the secret and
    /// password change in one store write. A failure at any step leaves the
    /// link redeemable and the old password in place.
    ///
    /// # Errors
    /// * `WeakPassword` - New password fails the policy
    /// * `ResetTokenInvalid` - Secret unknown, already used or expired
    pub async fn redeem_reset(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let new_password = NewPassword::new(new_password, self.policy.min_password_length)?;
        let password_hash = self.authenticator.hash_password(new_password.as_str())?;
        let secret_hash = digest::sha256_hex(token);

        let user = self
            .users
            .find_by_reset_secret(&secret_hash, Utc::now())
            .await?
            .ok_or(AuthError::ResetTokenInvalid)?;

        self.on_password_reset(&user.id).await?;

        let user_id = self
            .users
            .redeem_reset_secret(&secret_hash, &password_hash, Utc::now())
            .await?
            .ok_or(AuthError::ResetTokenInvalid)?;

        self.sweep_sessions_after_password_write(&user_id, None).await;
        tracing::info!(user_id = %user_id, "Password reset redeemed");

        let message = EmailMessage {
            to: user.email.to_string(),
            subject: "Your password was reset".to_string(),
            body: "Your password has been reset and every device has been signed out.\n\n\
                   If you did not make this change, contact support immediately."
                .to_string(),
        };
        self.send_best_effort(message, "password_reset_confirmation")
            .await;

        Ok(())
    }

    /// Change the password of a logged-in user, keeping the caller's session.
    ///
    /// Other sessions are revoked before the new hash is written, so a
    /// failed revocation leaves the old password valid for a retry.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown or inactive user, or wrong current password
    /// * `WeakPassword` - New password fails the policy
    pub async fn change_password_keeping_session(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: &str,
        current_session_id: &SessionId,
    ) -> Result<(), AuthError> {
        let user = match self.users.find_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Err(AuthError::InvalidCredentials),
        };

        if !self
            .authenticator
            .verify_password(current_password, &user.password_hash)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let new_password = NewPassword::new(new_password, self.policy.min_password_length)?;
        let password_hash = self.authenticator.hash_password(new_password.as_str())?;

        self.on_password_change(user_id, current_session_id).await?;
        self.users
            .update_password_hash(user_id, &password_hash, Utc::now())
            .await?;
        self.sweep_sessions_after_password_write(user_id, Some(current_session_id)).await;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Revoke sessions opened with the old password between the first
    /// revocation and the password write.
    ///
    /// The password is already changed at this point, so a failure is
    /// logged instead of returned.
    async fn sweep_sessions_after_password_write(
        &self,
        user_id: &UserId,
        keep: Option<&SessionId>,
    ) {
        match self.sessions.revoke_all_for_user(user_id, keep).await {
            Ok(0) => {}
            Ok(revoked) => tracing::warn!(
                user_id = %user_id,
                revoked = revoked,
                "Sessions opened during password write revoked"
            ),
            Err(e) => tracing::error!(
                user_id = %user_id,
                error = %e,
                "Failed to revoke sessions after password write"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use auth::Authenticator;
    use auth::TokenLifetimes;
    use chrono::DateTime;
    use mockall::mock;

    use super::*;
    use crate::errors::EmailDeliveryError;
    use crate::outbound::repositories::memory::InMemorySessionRepository;
    use crate::outbound::repositories::memory::InMemoryUserRepository;
    use crate::session::models::AuditInfo;
    use crate::session::models::Session;
    use crate::session::models::SessionPolicy;
    use crate::user::models::Role;

    mock! {
        pub TestEmailSender {}

        #[async_trait]
        impl EmailSender for TestEmailSender {
            async fn send(&self, message: &EmailMessage) -> Result<(), EmailDeliveryError>;
        }
    }

    fn authenticator() -> Arc<Authenticator> {
        Arc::new(Authenticator::new(
            b"test-secret-key-for-jwt-signing-at-least-32-bytes",
            "session-service",
            "platform",
            TokenLifetimes::default(),
        ))
    }

    fn policy() -> SessionPolicy {
        SessionPolicy {
            reset_response_floor: Duration::from_millis(20),
            ..SessionPolicy::default()
        }
    }

    /// Pull the plaintext secret out of a reset email body.
    fn token_from_body(body: &str) -> String {
        body.split("?token=")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_delivery_failure_rolls_back_secret() {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        let user_id = users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();

        let mut email_sender = MockTestEmailSender::new();
        email_sender
            .expect_send()
            .times(1)
            .returning(|_| Err(EmailDeliveryError::DeliveryFailed("smtp down".to_string())));

        let service = SessionService::new(
            Arc::clone(&users),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(email_sender),
            authenticator,
            policy(),
        );

        service.request_reset("bob@example.com").await;

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(user.reset_secret_hash.is_none());
        assert!(user.reset_secret_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_reset_stores_only_the_digest() {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        let user_id = users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();

        let sent = Arc::new(Mutex::new(Vec::<EmailMessage>::new()));
        let captured = Arc::clone(&sent);
        let mut email_sender = MockTestEmailSender::new();
        email_sender.expect_send().times(1).returning(move |message| {
            captured.lock().unwrap().push(message.clone());
            Ok(())
        });

        let service = SessionService::new(
            Arc::clone(&users),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(email_sender),
            authenticator,
            policy(),
        );

        service.request_reset("Bob@Example.com").await;

        let messages = sent.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "bob@example.com");

        let token = token_from_body(&messages[0].body);
        assert_eq!(token.len(), 64);

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert_eq!(user.reset_secret_hash, Some(digest::sha256_hex(&token)));
        assert!(user.reset_secret_expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_unknown_email_sends_nothing_and_waits_floor() {
        let mut email_sender = MockTestEmailSender::new();
        email_sender.expect_send().times(0);

        let service = SessionService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(email_sender),
            authenticator(),
            policy(),
        );

        let started = std::time::Instant::now();
        service.request_reset("ghost@example.com").await;
        service.request_reset("not an email").await;

        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_weak_password_does_not_burn_secret() {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        let user_id = users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();
        users
            .set_reset_secret(
                &user_id,
                &digest::sha256_hex("secret"),
                Utc::now() + chrono::Duration::minutes(15),
            )
            .await
            .unwrap();

        let service = SessionService::new(
            Arc::clone(&users),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(MockTestEmailSender::new()),
            authenticator,
            policy(),
        );

        let result = service.redeem_reset("secret", "short").await;
        assert!(matches!(result, Err(AuthError::WeakPassword(_))));

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(user.reset_secret_hash.is_some());
    }

    #[tokio::test]
    async fn test_expired_secret_is_rejected() {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        let user_id = users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();
        users
            .set_reset_secret(
                &user_id,
                &digest::sha256_hex("secret"),
                Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        let service = SessionService::new(
            users,
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(MockTestEmailSender::new()),
            authenticator,
            policy(),
        );

        let result = service.redeem_reset("secret", "brand new password").await;
        assert!(matches!(result, Err(AuthError::ResetTokenInvalid)));
    }

    #[tokio::test]
    async fn test_change_password_wrong_current_password() {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        let user_id = users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();

        let service = SessionService::new(
            Arc::clone(&users),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(MockTestEmailSender::new()),
            Arc::clone(&authenticator),
            policy(),
        );

        let result = service
            .change_password_keeping_session(
                &user_id,
                "not the password",
                "brand new password",
                &SessionId::new(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(authenticator
            .verify_password("old password", &user.password_hash)
            .unwrap());
    }

    /// Mail transport that takes far longer than the response floor.
    struct SlowEmailSender {
        delay: Duration,
        delivered: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for SlowEmailSender {
        async fn send(&self, message: &EmailMessage) -> Result<(), EmailDeliveryError> {
            tokio::time::sleep(self.delay).await;
            self.delivered.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_delivery_does_not_lengthen_reset_request() {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();

        let email_sender = Arc::new(SlowEmailSender {
            delay: Duration::from_millis(700),
            delivered: Mutex::new(Vec::new()),
        });
        let service = SessionService::new(
            users,
            Arc::new(InMemorySessionRepository::new()),
            Arc::clone(&email_sender),
            authenticator,
            SessionPolicy {
                reset_response_floor: Duration::from_millis(100),
                ..SessionPolicy::default()
            },
        );

        let started = std::time::Instant::now();
        service.request_reset("bob@example.com").await;
        let known = started.elapsed();

        let started = std::time::Instant::now();
        service.request_reset("nobody@example.com").await;
        let unknown = started.elapsed();

        let gap = if known > unknown {
            known - unknown
        } else {
            unknown - known
        };
        assert!(gap < Duration::from_millis(100));
        assert!(known < Duration::from_millis(700));
        assert!(email_sender.delivered.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(email_sender.delivered.lock().unwrap().len(), 1);
    }

    /// Session store whose bulk revocation can be made to fail.
    struct FlakySessionRepository {
        inner: InMemorySessionRepository,
        fail_bulk_revoke: AtomicBool,
    }

    #[async_trait]
    impl SessionRepository for FlakySessionRepository {
        async fn create(&self, session: Session) -> Result<Session, AuthError> {
            self.inner.create(session).await
        }

        async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, AuthError> {
            self.inner.find_by_id(id).await
        }

        async fn list_active_for_user(
            &self,
            user_id: &UserId,
            now: DateTime<Utc>,
        ) -> Result<Vec<Session>, AuthError> {
            self.inner.list_active_for_user(user_id, now).await
        }

        async fn compare_and_swap_token_hash(
            &self,
            id: &SessionId,
            expected_hash: &str,
            new_hash: &str,
            expires_at: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> Result<bool, AuthError> {
            self.inner
                .compare_and_swap_token_hash(id, expected_hash, new_hash, expires_at, now)
                .await
        }

        async fn revoke_on_reuse(
            &self,
            id: &SessionId,
            presented_hash: &str,
        ) -> Result<bool, AuthError> {
            self.inner.revoke_on_reuse(id, presented_hash).await
        }

        async fn revoke(&self, id: &SessionId) -> Result<bool, AuthError> {
            self.inner.revoke(id).await
        }

        async fn revoke_all_for_user(
            &self,
            user_id: &UserId,
            except: Option<&SessionId>,
        ) -> Result<u64, AuthError> {
            if self.fail_bulk_revoke.load(Ordering::SeqCst) {
                return Err(AuthError::DatabaseError("transient".to_string()));
            }
            self.inner.revoke_all_for_user(user_id, except).await
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
            self.inner.delete_expired(now).await
        }
    }

    async fn flaky_service() -> (
        SessionService<InMemoryUserRepository, FlakySessionRepository, MockTestEmailSender>,
        Arc<InMemoryUserRepository>,
        Arc<FlakySessionRepository>,
        UserId,
    ) {
        let authenticator = authenticator();
        let users = Arc::new(InMemoryUserRepository::new());
        let user_id = users
            .insert_user(
                "bob@example.com",
                &authenticator.hash_password("old password").unwrap(),
                Role::Student,
                true,
            )
            .await
            .unwrap();
        let sessions = Arc::new(FlakySessionRepository {
            inner: InMemorySessionRepository::new(),
            fail_bulk_revoke: AtomicBool::new(true),
        });

        let mut email_sender = MockTestEmailSender::new();
        email_sender.expect_send().returning(|_| Ok(()));

        let service = SessionService::new(
            Arc::clone(&users),
            Arc::clone(&sessions),
            Arc::new(email_sender),
            authenticator,
            policy(),
        );
        (service, users, sessions, user_id)
    }

    async fn open_session(sessions: &FlakySessionRepository, user_id: UserId) -> SessionId {
        sessions
            .create(Session::new(
                user_id,
                AuditInfo::default(),
                Utc::now() + chrono::Duration::days(7),
            ))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_failed_cascade_keeps_old_password_for_retry() {
        let (service, users, sessions, user_id) = flaky_service().await;
        let current = open_session(&sessions, user_id).await;
        let other = open_session(&sessions, user_id).await;

        let result = service
            .change_password_keeping_session(
                &user_id,
                "old password",
                "brand new password",
                &current,
            )
            .await;
        assert!(matches!(result, Err(AuthError::DatabaseError(_))));

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(service
            .authenticator
            .verify_password("old password", &user.password_hash)
            .unwrap());
        assert!(user.password_changed_at.is_none());

        sessions.fail_bulk_revoke.store(false, Ordering::SeqCst);
        service
            .change_password_keeping_session(
                &user_id,
                "old password",
                "brand new password",
                &current,
            )
            .await
            .unwrap();

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(service
            .authenticator
            .verify_password("brand new password", &user.password_hash)
            .unwrap());
        assert!(!sessions.find_by_id(&current).await.unwrap().unwrap().is_revoked);
        assert!(sessions.find_by_id(&other).await.unwrap().unwrap().is_revoked);
    }

    #[tokio::test]
    async fn test_failed_cascade_does_not_burn_reset_link() {
        let (service, users, sessions, user_id) = flaky_service().await;
        let session_id = open_session(&sessions, user_id).await;
        users
            .set_reset_secret(
                &user_id,
                &digest::sha256_hex("secret"),
                Utc::now() + chrono::Duration::minutes(15),
            )
            .await
            .unwrap();

        let result = service.redeem_reset("secret", "brand new password").await;
        assert!(matches!(result, Err(AuthError::DatabaseError(_))));

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(user.reset_secret_hash.is_some());
        assert!(service
            .authenticator
            .verify_password("old password", &user.password_hash)
            .unwrap());

        sessions.fail_bulk_revoke.store(false, Ordering::SeqCst);
        service
            .redeem_reset("secret", "brand new password")
            .await
            .unwrap();

        let user = users.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(user.reset_secret_hash.is_none());
        assert!(service
            .authenticator
            .verify_password("brand new password", &user.password_hash)
            .unwrap());
        assert!(sessions.find_by_id(&session_id).await.unwrap().unwrap().is_revoked);
    }
}
