use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AuthError;
use crate::session::models::AuditInfo;
use crate::session::models::Session;
use crate::session::models::SessionId;
use crate::session::ports::SessionRepository;
use crate::user::models::UserId;

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_hash, previous_token_hash, rotated_at, \
     is_revoked, expires_at, user_agent, ip_address, created_at";

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    refresh_token_hash: String,
    previous_token_hash: Option<String>,
    rotated_at: Option<DateTime<Utc>>,
    is_revoked: bool,
    expires_at: DateTime<Utc>,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(r: SessionRow) -> Self {
        Session {
            id: SessionId(r.id),
            user_id: UserId(r.user_id),
            refresh_token_hash: r.refresh_token_hash,
            previous_token_hash: r.previous_token_hash,
            rotated_at: r.rotated_at,
            is_revoked: r.is_revoked,
            expires_at: r.expires_at,
            audit: AuditInfo {
                user_agent: r.user_agent,
                ip_address: r.ip_address,
            },
            created_at: r.created_at,
        }
    }
}

/// Session store on Postgres.
///
/// Every conditional transition is one `UPDATE ... WHERE`, so it stays
/// atomic across server instances sharing the database.
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, AuthError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, user_id, refresh_token_hash, previous_token_hash, rotated_at,
                is_revoked, expires_at, user_agent, ip_address, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session.id.0)
        .bind(session.user_id.0)
        .bind(&session.refresh_token_hash)
        .bind(&session.previous_token_hash)
        .bind(session.rotated_at)
        .bind(session.is_revoked)
        .bind(session.expires_at)
        .bind(&session.audit.user_agent)
        .bind(&session.audit.ip_address)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(session)
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(row.map(Session::from))
    }

    async fn list_active_for_user(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, AuthError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM sessions
            WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2
            ORDER BY created_at DESC
            "#,
            SESSION_COLUMNS
        ))
        .bind(user_id.0)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn compare_and_swap_token_hash(
        &self,
        id: &SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        // SET expressions see the pre-update row, so previous_token_hash
        // receives the hash being replaced.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET previous_token_hash = refresh_token_hash,
                refresh_token_hash = $3,
                rotated_at = $5,
                expires_at = $4
            WHERE id = $1
              AND refresh_token_hash = $2
              AND is_revoked = FALSE
              AND expires_at > $5
            "#,
        )
        .bind(id.0)
        .bind(expected_hash)
        .bind(new_hash)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_on_reuse(
        &self,
        id: &SessionId,
        presented_hash: &str,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_revoked = TRUE
            WHERE id = $1 AND refresh_token_hash <> $2
            "#,
        )
        .bind(id.0)
        .bind(presented_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, id: &SessionId) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_revoked = TRUE
            WHERE id = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        except: Option<&SessionId>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_revoked = TRUE
            WHERE user_id = $1
              AND is_revoked = FALSE
              AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(user_id.0)
        .bind(except.map(|id| id.0))
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
