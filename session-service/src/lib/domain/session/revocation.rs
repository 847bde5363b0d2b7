use crate::errors::AuthError;
use crate::session::models::SessionId;
use crate::session::ports::EmailSender;
use crate::session::ports::SessionRepository;
use crate::session::service::SessionService;
use crate::user::models::UserId;
use crate::user::ports::UserRepository;

// Revocation is idempotent everywhere: revoking an already revoked session
// is a no-op, and only the revoked flag is written.
impl<UR, SR, ES> SessionService<UR, SR, ES>
where
    UR: UserRepository,
    SR: SessionRepository,
    ES: EmailSender,
{
    /// Revoke exactly one session (logout).
    pub async fn revoke_one(&self, session_id: &SessionId) -> Result<(), AuthError> {
        if self.sessions.revoke(session_id).await? {
            tracing::info!(session_id = %session_id, "Session revoked");
        }
        Ok(())
    }

    /// Revoke one of `user_id`'s own sessions.
    ///
    /// # Errors
    /// * `SessionRevoked` - Session does not exist or belongs to another user
    pub async fn revoke_owned(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<(), AuthError> {
        match self.sessions.find_by_id(session_id).await? {
            Some(session) if &session.user_id == user_id => self.revoke_one(session_id).await,
            _ => Err(AuthError::SessionRevoked),
        }
    }

    /// Password changed from a logged-in device: keep that device's session.
    pub async fn on_password_change(
        &self,
        user_id: &UserId,
        current_session_id: &SessionId,
    ) -> Result<u64, AuthError> {
        let revoked = self
            .sessions
            .revoke_all_for_user(user_id, Some(current_session_id))
            .await?;

        tracing::info!(
            user_id = %user_id,
            kept_session_id = %current_session_id,
            revoked = revoked,
            "Sessions revoked after password change"
        );
        Ok(revoked)
    }

    /// Password reset happened out-of-band: no session is trusted.
    pub async fn on_password_reset(&self, user_id: &UserId) -> Result<u64, AuthError> {
        let revoked = self.sessions.revoke_all_for_user(user_id, None).await?;

        tracing::info!(
            user_id = %user_id,
            revoked = revoked,
            "Sessions revoked after password reset"
        );
        Ok(revoked)
    }

    /// Account deactivated by its owner service: revoke every session.
    pub async fn revoke_for_deactivation(&self, user_id: &UserId) -> Result<u64, AuthError> {
        let revoked = self.sessions.revoke_all_for_user(user_id, None).await?;

        tracing::info!(
            user_id = %user_id,
            revoked = revoked,
            "Sessions revoked after deactivation"
        );
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use auth::Authenticator;
    use auth::TokenLifetimes;
    use chrono::Duration;
    use chrono::Utc;

    use super::*;
    use crate::errors::EmailDeliveryError;
    use crate::outbound::repositories::memory::InMemorySessionRepository;
    use crate::outbound::repositories::memory::InMemoryUserRepository;
    use crate::session::models::AuditInfo;
    use crate::session::models::EmailMessage;
    use crate::session::models::Session;
    use crate::session::models::SessionPolicy;

    struct NoopEmailSender;

    #[async_trait]
    impl EmailSender for NoopEmailSender {
        async fn send(&self, _message: &EmailMessage) -> Result<(), EmailDeliveryError> {
            Ok(())
        }
    }

    type TestService =
        SessionService<InMemoryUserRepository, InMemorySessionRepository, NoopEmailSender>;

    fn service(sessions: Arc<InMemorySessionRepository>) -> TestService {
        SessionService::new(
            Arc::new(InMemoryUserRepository::new()),
            sessions,
            Arc::new(NoopEmailSender),
            Arc::new(Authenticator::new(
                b"test-secret-key-for-jwt-signing-at-least-32-bytes",
                "session-service",
                "platform",
                TokenLifetimes::default(),
            )),
            SessionPolicy::default(),
        )
    }

    async fn open_session(sessions: &InMemorySessionRepository, user_id: UserId) -> SessionId {
        sessions
            .create(Session::new(
                user_id,
                AuditInfo::default(),
                Utc::now() + Duration::days(7),
            ))
            .await
            .unwrap()
            .id
    }

    async fn is_revoked(sessions: &InMemorySessionRepository, id: &SessionId) -> bool {
        sessions.find_by_id(id).await.unwrap().unwrap().is_revoked
    }

    #[tokio::test]
    async fn test_revoke_one_is_idempotent() {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let service = service(Arc::clone(&sessions));
        let id = open_session(&sessions, UserId::new()).await;

        service.revoke_one(&id).await.unwrap();
        service.revoke_one(&id).await.unwrap();
        service.revoke_one(&SessionId::new()).await.unwrap();

        assert!(is_revoked(&sessions, &id).await);
    }

    #[tokio::test]
    async fn test_password_change_keeps_current_session() {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let service = service(Arc::clone(&sessions));
        let user_id = UserId::new();
        let current = open_session(&sessions, user_id).await;
        let other = open_session(&sessions, user_id).await;
        let bystander = open_session(&sessions, UserId::new()).await;

        let revoked = service.on_password_change(&user_id, &current).await.unwrap();

        assert_eq!(revoked, 1);
        assert!(!is_revoked(&sessions, &current).await);
        assert!(is_revoked(&sessions, &other).await);
        assert!(!is_revoked(&sessions, &bystander).await);
    }

    #[tokio::test]
    async fn test_password_reset_revokes_everything() {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let service = service(Arc::clone(&sessions));
        let user_id = UserId::new();
        let first = open_session(&sessions, user_id).await;
        let second = open_session(&sessions, user_id).await;

        assert_eq!(service.on_password_reset(&user_id).await.unwrap(), 2);
        assert_eq!(service.on_password_reset(&user_id).await.unwrap(), 0);
        assert!(is_revoked(&sessions, &first).await);
        assert!(is_revoked(&sessions, &second).await);
    }

    #[tokio::test]
    async fn test_revoke_owned_rejects_foreign_session() {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let service = service(Arc::clone(&sessions));
        let owner = UserId::new();
        let id = open_session(&sessions, owner).await;

        let result = service.revoke_owned(&UserId::new(), &id).await;
        assert!(matches!(result, Err(AuthError::SessionRevoked)));
        assert!(!is_revoked(&sessions, &id).await);

        service.revoke_owned(&owner, &id).await.unwrap();
        assert!(is_revoked(&sessions, &id).await);
    }

    #[tokio::test]
    async fn test_deactivation_revokes_all() {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let service = service(Arc::clone(&sessions));
        let user_id = UserId::new();
        let id = open_session(&sessions, user_id).await;

        assert_eq!(service.revoke_for_deactivation(&user_id).await.unwrap(), 1);
        assert!(is_revoked(&sessions, &id).await);
    }
}
