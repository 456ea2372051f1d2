//! Authentication middleware — access-token extraction and verification.
//!
//! The token is read from the `access_token` cookie or an
//! `Authorization: Bearer` header. The verified claims ride along in request
//! extensions; handlers never see an unauthenticated request.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::CookieJar;

use shutter_core::auth::{jwt, queries};
use shutter_core::models::auth::AccessClaims;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ACCESS_COOKIE;

/// Key used to store verified `AccessClaims` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

fn extract_access_token(request: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Axum middleware: verifies the access token and injects `AuthenticatedUser`
/// into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_access_token(&request)
        .ok_or_else(|| AppError::Unauthorized("Missing access token".into()))?;

    let claims = jwt::verify_access_token(&token, state.config.access_token_secret.as_bytes())
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}

/// Axum middleware: admin gate, layered after `require_auth`.
///
/// The token's role claim is a cache. When it does not already say `admin`,
/// the store is consulted — privilege elevation takes effect within the
/// token's lifetime, de-elevation does not.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Missing access token".into()))?;

    if user.0.role == "admin" {
        return Ok(next.run(request).await);
    }

    let stored = queries::get_user_by_id(&state.pool, &user.0.sub).await?;
    if stored.is_some_and(|u| u.role == "admin") {
        let mut claims = user.0;
        claims.role = "admin".to_string();
        request.extensions_mut().insert(AuthenticatedUser(claims));
        return Ok(next.run(request).await);
    }

    Err(AppError::Forbidden("Admin role required".into()))
}
