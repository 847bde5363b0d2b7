use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedSession;
use crate::inbound::http::router::AppState;
use crate::session::models::SessionSummary;

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(claims)): Extension<AuthenticatedSession>,
) -> Result<ApiSuccess<Vec<SessionData>>, ApiError> {
    state
        .session_service
        .list_sessions(&claims.user_id, &claims.session_id)
        .await
        .map_err(ApiError::from)
        .map(|sessions| {
            ApiSuccess::new(
                StatusCode::OK,
                sessions.iter().map(SessionData::from).collect(),
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionData {
    pub id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl From<&SessionSummary> for SessionData {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            user_agent: summary.user_agent.clone(),
            ip_address: summary.ip_address.clone(),
            created_at: summary.created_at,
            expires_at: summary.expires_at,
            is_current: summary.is_current,
        }
    }
}
