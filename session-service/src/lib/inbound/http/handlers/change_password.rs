use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::Deserialize;

use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::handlers::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedSession;
use crate::inbound::http::router::AppState;

/// Change the password; every other session of the user is signed out.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(claims)): Extension<AuthenticatedSession>,
    Json(body): Json<ChangePasswordRequestBody>,
) -> Result<ApiSuccess<()>, ApiError> {
    state
        .session_service
        .change_password(
            &claims.user_id,
            &body.current_password,
            &body.new_password,
            &claims.session_id,
        )
        .await
        .map_err(ApiError::from)
        .map(|_| ApiSuccess::new(StatusCode::OK, ()))
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ChangePasswordRequestBody {
    current_password: String,
    new_password: String,
}
