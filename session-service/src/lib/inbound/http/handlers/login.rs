use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::Json;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use super::TokenPairData;
use crate::inbound::http::router::AppState;
use crate::session::models::AuditInfo;
use crate::session::models::LoginCommand;
use crate::user::models::EmailAddress;
use crate::user::models::UserProfile;

pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequestBody>,
) -> Result<ApiSuccess<LoginResponseData>, ApiError> {
    // A malformed email is reported like any other failed login.
    let email = EmailAddress::new(body.email)
        .map_err(|_| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let command = LoginCommand {
        email,
        password: body.password,
        audit: audit_info(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
    };

    state
        .session_service
        .login(command)
        .await
        .map_err(ApiError::from)
        .map(|outcome| {
            ApiSuccess::new(
                StatusCode::OK,
                LoginResponseData {
                    user: (&outcome.user).into(),
                    session_id: outcome.session_id.to_string(),
                    tokens: outcome.tokens.into(),
                },
            )
        })
}

/// Client metadata for the session record. The first `X-Forwarded-For` hop
/// wins over the socket address when the service runs behind a proxy.
fn audit_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> AuditInfo {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    AuditInfo {
        user_agent,
        ip_address: forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginRequestBody {
    email: String,
    password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginResponseData {
    pub user: UserData,
    pub session_id: String,
    #[serde(flatten)]
    pub tokens: TokenPairData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserData {
    pub id: String,
    pub email: String,
    pub role: String,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&UserProfile> for UserData {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.as_str().to_string(),
            role: user.role.as_str().to_string(),
            last_login_at: user.last_login_at,
        }
    }
}
