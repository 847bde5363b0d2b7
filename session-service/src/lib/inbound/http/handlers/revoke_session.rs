use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;

use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedSession;
use crate::inbound::http::router::AppState;
use crate::session::models::SessionId;

pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(claims)): Extension<AuthenticatedSession>,
    Path(session_id): Path<String>,
) -> Result<ApiSuccess<()>, ApiError> {
    let session_id =
        SessionId::from_string(&session_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .session_service
        .revoke_session(&claims.user_id, &session_id)
        .await
        .map_err(ApiError::from)
        .map(|_| ApiSuccess::new(StatusCode::OK, ()))
}
