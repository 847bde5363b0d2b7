//! In-process adapters for the user and session stores.
//!
//! Every conditional operation runs under a single write lock, which gives
//! the same atomicity the Postgres adapters get from conditional `UPDATE`s.
//! Used by tests and by single-instance development setups.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::errors::AuthError;
use crate::session::models::Session;
use crate::session::models::SessionId;
use crate::session::ports::SessionRepository;
use crate::user::models::EmailAddress;
use crate::user::models::Role;
use crate::user::models::User;
use crate::user::models::UserId;
use crate::user::ports::UserRepository;

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account.
    ///
    /// # Errors
    /// * `InvalidEmail` - Email does not validate
    pub async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
        is_active: bool,
    ) -> Result<UserId, AuthError> {
        let user = User {
            id: UserId::new(),
            email: EmailAddress::new(email.to_string())?,
            password_hash: password_hash.to_string(),
            role,
            is_active,
            password_changed_at: None,
            reset_secret_hash: None,
            reset_secret_expires_at: None,
            last_login_at: None,
            created_at: Utc::now(),
        };
        let id = user.id;

        self.users.write().await.insert(id, user);
        Ok(id)
    }

    /// Flip the active flag, as the account owner's service would.
    pub async fn set_active(&self, id: &UserId, is_active: bool) {
        if let Some(user) = self.users.write().await.get_mut(id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn update_password_hash(
        &self,
        id: &UserId,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| AuthError::DatabaseError(format!("User {} not found", id)))?;

        user.password_hash = password_hash.to_string();
        user.password_changed_at = Some(changed_at);
        Ok(())
    }

    async fn set_reset_secret(
        &self,
        id: &UserId,
        secret_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if let Some(user) = self.users.write().await.get_mut(id) {
            user.reset_secret_hash = Some(secret_hash.to_string());
            user.reset_secret_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn clear_reset_secret(&self, id: &UserId, secret_hash: &str) -> Result<(), AuthError> {
        if let Some(user) = self.users.write().await.get_mut(id) {
            if user.reset_secret_hash.as_deref() == Some(secret_hash) {
                user.reset_secret_hash = None;
                user.reset_secret_expires_at = None;
            }
        }
        Ok(())
    }

    async fn find_by_reset_secret(
        &self,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| holds_live_secret(user, secret_hash, now))
            .cloned())
    }

    async fn redeem_reset_secret(
        &self,
        secret_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, AuthError> {
        let mut users = self.users.write().await;

        let owner = users
            .values_mut()
            .find(|user| holds_live_secret(user, secret_hash, now));

        Ok(owner.map(|user| {
            user.reset_secret_hash = None;
            user.reset_secret_expires_at = None;
            user.password_hash = password_hash.to_string();
            user.password_changed_at = Some(now);
            user.id
        }))
    }

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), AuthError> {
        if let Some(user) = self.users.write().await.get_mut(id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

fn holds_live_secret(user: &User, secret_hash: &str, now: DateTime<Utc>) -> bool {
    user.is_active
        && user.reset_secret_hash.as_deref() == Some(secret_hash)
        && user.reset_secret_expires_at.is_some_and(|at| at > now)
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, revoked and expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: Session) -> Result<Session, AuthError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(AuthError::DatabaseError(format!(
                "Session {} already exists",
                session.id
            )));
        }

        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, AuthError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn list_active_for_user(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, AuthError> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| &session.user_id == user_id && session.is_active(now))
            .cloned()
            .collect();

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn compare_and_swap_token_hash(
        &self,
        id: &SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut sessions = self.sessions.write().await;

        match sessions.get_mut(id) {
            Some(session)
                if session.is_active(now) && session.refresh_token_hash == expected_hash =>
            {
                session.previous_token_hash = Some(std::mem::replace(
                    &mut session.refresh_token_hash,
                    new_hash.to_string(),
                ));
                session.rotated_at = Some(now);
                session.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_on_reuse(
        &self,
        id: &SessionId,
        presented_hash: &str,
    ) -> Result<bool, AuthError> {
        let mut sessions = self.sessions.write().await;

        match sessions.get_mut(id) {
            Some(session) if session.refresh_token_hash != presented_hash => {
                session.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, id: &SessionId) -> Result<bool, AuthError> {
        let mut sessions = self.sessions.write().await;

        match sessions.get_mut(id) {
            Some(session) if !session.is_revoked => {
                session.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        except: Option<&SessionId>,
    ) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.write().await;
        let mut revoked = 0;

        for session in sessions.values_mut() {
            if &session.user_id == user_id
                && !session.is_revoked
                && except != Some(&session.id)
            {
                session.is_revoked = true;
                revoked += 1;
            }
        }

        Ok(revoked)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, session| !session.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}
