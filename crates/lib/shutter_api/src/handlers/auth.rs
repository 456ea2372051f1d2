//! Authentication request handlers.
//!
//! Handlers own cookie delivery; the session logic lives in
//! `services::auth`. Every failure on the refresh/logout paths clears the
//! session cookies so the browser is forced back to a clean login.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;

use shutter_core::models::auth::User;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::RequestMeta;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AckResponse, LoginRequest, LoginResponse, MeResponse, RegisterRequest, UserPayload};
use crate::services::{auth, cookies};
use crate::services::cookies::REFRESH_COOKIE;

fn user_payload(user: User) -> UserPayload {
    UserPayload {
        id: user.id,
        login_name: user.login_name,
        first_name: user.first_name,
        last_name: user.last_name,
        role: user.role,
    }
}

fn session_response(
    state: &AppState,
    jar: CookieJar,
    user: User,
    tokens: auth::SessionTokens,
) -> (CookieJar, Json<LoginResponse>) {
    let jar = jar
        .add(cookies::access_cookie(&state.config, &tokens.access_token))
        .add(cookies::refresh_cookie(&state.config, &tokens.refresh_token));
    let token = state
        .config
        .return_access_token_in_body
        .then_some(tokens.access_token);
    (
        jar,
        Json(LoginResponse {
            user: user_payload(user),
            token,
        }),
    )
}

/// `POST /api/auth/login` — authenticate with login name + password.
pub async fn login_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let (user, tokens) = auth::login(
        &state.pool,
        &state.config,
        &body.login_name,
        &body.password,
        &meta,
    )
    .await?;
    Ok(session_response(&state, jar, user, tokens))
}

/// `POST /api/auth/register` — create a local account and start a session.
pub async fn register_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let (user, tokens) = auth::register(
        &state.pool,
        &state.config,
        &body.login_name,
        &body.password,
        &body.first_name,
        &body.last_name,
        &meta,
    )
    .await?;
    Ok(session_response(&state, jar, user, tokens))
}

/// `POST /api/auth/refresh` — rotate the refresh token delivered via its
/// scoped cookie. Any failure clears the session cookies.
pub async fn refresh_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    jar: CookieJar,
) -> Response {
    let result = match jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) {
        None => Err(AppError::Unauthorized("Unauthorized".into())),
        Some(raw) => auth::refresh(&state.pool, &state.config, &raw, &meta).await,
    };

    match result {
        Ok(tokens) => {
            let jar = jar
                .add(cookies::access_cookie(&state.config, &tokens.access_token))
                .add(cookies::refresh_cookie(&state.config, &tokens.refresh_token));
            (jar, Json(AckResponse { ok: true })).into_response()
        }
        Err(err) => {
            let jar = cookies::clear_session_cookies(jar, &state.config);
            (jar, err).into_response()
        }
    }
}

/// `POST /api/auth/logout` — best-effort revocation, unconditional cookie
/// clearing. Idempotent.
pub async fn logout_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    let raw = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    let result = auth::logout(&state.pool, raw.as_deref()).await;

    let jar = cookies::clear_session_cookies(jar, &state.config);
    match result {
        Ok(()) => (jar, Json(AckResponse { ok: true })).into_response(),
        Err(err) => (jar, err).into_response(),
    }
}

/// `POST /api/auth/logout-all` — revoke every session of the authenticated
/// user, across families.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> Response {
    let result = auth::logout_all(&state.pool, &user.0.sub).await;

    let jar = cookies::clear_session_cookies(jar, &state.config);
    match result {
        Ok(()) => (jar, Json(AckResponse { ok: true })).into_response(),
        Err(err) => (jar, err).into_response(),
    }
}

/// `GET /api/auth/me` — the current user's public profile.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<MeResponse>> {
    let user = auth::me(&state.pool, &user.0.sub).await?;
    Ok(Json(MeResponse {
        id: user.id,
        display_name: user.display_name.unwrap_or_default(),
        handle: user.handle.unwrap_or_default(),
        avatar_url: user.avatar_url.unwrap_or_default(),
        auth_provider: user.auth_provider,
        role: user.role,
    }))
}
