//! Cookie service — the browser-facing session cookie policy.
//!
//! Names and scope paths are part of the wire contract: the refresh cookie
//! only travels to its rotation endpoint, the anti-forgery state cookie only
//! to the OAuth callback.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::ApiConfig;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Cookie name for the OAuth anti-forgery state.
pub const STATE_COOKIE: &str = "oauth_state";

/// Scope path of the refresh cookie: the rotation endpoint only.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth/refresh";
/// Scope path of the state cookie: the OAuth callback only.
pub const STATE_COOKIE_PATH: &str = "/api/auth/github/callback";

/// State cookie lifetime: 10 minutes, matching the server-side store TTL.
const STATE_COOKIE_TTL: Duration = Duration::minutes(10);

fn session_cookie(
    name: &str,
    value: String,
    path: &str,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(path.to_string())
        .max_age(max_age)
        .build()
}

/// Build the httpOnly cookie carrying the access token.
pub fn access_cookie(config: &ApiConfig, token: &str) -> Cookie<'static> {
    session_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        "/",
        Duration::milliseconds(config.access_ttl.num_milliseconds()),
        config.production,
    )
}

/// Build the httpOnly cookie carrying the refresh token, scoped to the
/// rotation endpoint.
pub fn refresh_cookie(config: &ApiConfig, token: &str) -> Cookie<'static> {
    session_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        REFRESH_COOKIE_PATH,
        Duration::milliseconds(config.refresh_ttl.num_milliseconds()),
        config.production,
    )
}

/// Build the anti-forgery state cookie, scoped to the OAuth callback.
pub fn state_cookie(config: &ApiConfig, state: &str) -> Cookie<'static> {
    session_cookie(
        STATE_COOKIE,
        state.to_string(),
        STATE_COOKIE_PATH,
        STATE_COOKIE_TTL,
        config.production,
    )
}

/// Build an expired cookie that clears the access token.
pub fn clear_access_cookie(config: &ApiConfig) -> Cookie<'static> {
    session_cookie(ACCESS_COOKIE, String::new(), "/", Duration::ZERO, config.production)
}

/// Build an expired cookie that clears the refresh token.
pub fn clear_refresh_cookie(config: &ApiConfig) -> Cookie<'static> {
    session_cookie(
        REFRESH_COOKIE,
        String::new(),
        REFRESH_COOKIE_PATH,
        Duration::ZERO,
        config.production,
    )
}

/// Build an expired cookie that clears the OAuth state.
pub fn clear_state_cookie(config: &ApiConfig) -> Cookie<'static> {
    session_cookie(
        STATE_COOKIE,
        String::new(),
        STATE_COOKIE_PATH,
        Duration::ZERO,
        config.production,
    )
}

/// Clear both session cookies (used on every refresh/logout failure path).
pub fn clear_session_cookies(jar: CookieJar, config: &ApiConfig) -> CookieJar {
    jar.add(clear_access_cookie(config))
        .add(clear_refresh_cookie(config))
}
