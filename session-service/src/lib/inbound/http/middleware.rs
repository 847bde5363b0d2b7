use axum::extract::Request;
use axum::extract::State;
use axum::http::{self};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::inbound::http::handlers::ApiError;
use crate::inbound::http::router::AppState;
use crate::session::models::SessionClaims;

/// Extension type carrying the verified session of the request
#[derive(Debug, Clone)]
pub struct AuthenticatedSession(pub SessionClaims);

/// Middleware that checks the bearer access token and its session
///
/// A token whose signature and expiry are fine is still refused once its
/// session has been revoked.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    // Owned so no borrow of the request is held across the await.
    let token = extract_token_from_header(&req)?.to_string();

    let claims = state
        .session_service
        .get_session_claims(&token)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Access token rejected");
            ApiError::from(e).into_response()
        })?;

    req.extensions_mut().insert(AuthenticatedSession(claims));

    Ok(next.run(req).await)
}

fn extract_token_from_header(req: &Request) -> Result<&str, Response> {
    let auth_header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| {
            ApiError::Unauthorized("Missing Authorization header".to_string()).into_response()
        })?;

    let auth_str = auth_header.to_str().map_err(|_| {
        ApiError::Unauthorized("Invalid Authorization header".to_string()).into_response()
    })?;

    auth_str.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized(
            "Invalid Authorization header format. Expected: Bearer <token>".to_string(),
        )
        .into_response()
    })
}
