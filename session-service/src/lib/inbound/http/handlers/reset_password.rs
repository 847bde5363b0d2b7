use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::ApiError;
use super::ApiSuccess;
use crate::inbound::http::router::AppState;

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequestBody>,
) -> Result<ApiSuccess<()>, ApiError> {
    state
        .session_service
        .redeem_password_reset(&body.token, &body.new_password)
        .await
        .map_err(ApiError::from)
        .map(|_| ApiSuccess::new(StatusCode::OK, ()))
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ResetPasswordRequestBody {
    token: String,
    new_password: String,
}
