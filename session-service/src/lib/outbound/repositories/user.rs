use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AuthError;
use crate::user::models::EmailAddress;
use crate::user::models::User;
use crate::user::models::UserId;
use crate::user::ports::UserRepository;

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    password_changed_at: Option<DateTime<Utc>>,
    reset_secret_hash: Option<String>,
    reset_secret_expires_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AuthError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId(r.id),
            email: EmailAddress::new(r.email)?,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            is_active: r.is_active,
            password_changed_at: r.password_changed_at,
            reset_secret_hash: r.reset_secret_hash,
            reset_secret_expires_at: r.reset_secret_expires_at,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
        })
    }
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, is_active, password_changed_at,
                   reset_secret_hash, reset_secret_expires_at, last_login_at, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, is_active, password_changed_at,
                   reset_secret_hash, reset_secret_expires_at, last_login_at, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        row.map(User::try_from).transpose()
    }

    async fn update_password_hash(
        &self,
        id: &UserId,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, password_changed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::DatabaseError(format!("User {} not found", id)));
        }

        Ok(())
    }

    async fn set_reset_secret(
        &self,
        id: &UserId,
        secret_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_secret_hash = $2, reset_secret_expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(secret_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn clear_reset_secret(&self, id: &UserId, secret_hash: &str) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_secret_hash = NULL, reset_secret_expires_at = NULL
            WHERE id = $1 AND reset_secret_hash = $2
            "#,
        )
        .bind(id.0)
        .bind(secret_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find_by_reset_secret(
        &self,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, is_active, password_changed_at,
                   reset_secret_hash, reset_secret_expires_at, last_login_at, created_at
            FROM users
            WHERE reset_secret_hash = $1
              AND reset_secret_expires_at > $2
              AND is_active = TRUE
            "#,
        )
        .bind(secret_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        row.map(User::try_from).transpose()
    }

    async fn redeem_reset_secret(
        &self,
        secret_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, AuthError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET reset_secret_hash = NULL,
                reset_secret_expires_at = NULL,
                password_hash = $2,
                password_changed_at = $3
            WHERE reset_secret_hash = $1
              AND reset_secret_expires_at > $3
              AND is_active = TRUE
            RETURNING id
            "#,
        )
        .bind(secret_hash)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(id.map(UserId))
    }

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
