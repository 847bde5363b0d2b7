use axum::http::StatusCode;
use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedSession;
use crate::session::models::SessionClaims;

pub async fn get_session(
    Extension(AuthenticatedSession(claims)): Extension<AuthenticatedSession>,
) -> ApiSuccess<GetSessionResponseData> {
    ApiSuccess::new(StatusCode::OK, (&claims).into())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetSessionResponseData {
    pub user_id: String,
    pub session_id: String,
    pub role: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<&SessionClaims> for GetSessionResponseData {
    fn from(claims: &SessionClaims) -> Self {
        Self {
            user_id: claims.user_id.to_string(),
            session_id: claims.session_id.to_string(),
            role: claims.role.map(|role| role.as_str().to_string()),
            expires_at: claims.expires_at,
        }
    }
}
