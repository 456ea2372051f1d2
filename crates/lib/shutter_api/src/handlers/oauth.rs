//! GitHub federated-login handlers.
//!
//! The authorization-code dance runs over six audited checkpoints. Every
//! callback exit path, success included, clears the anti-forgery state
//! cookie; the state value itself is consumed server-side exactly once.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use url::Url;

use shutter_core::oauth::OAuthError;
use shutter_core::oauth::audit::FlowStep;
use shutter_core::oauth::github;
use shutter_core::oauth::state::generate_state;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::RequestMeta;
use crate::models::OAuthCallbackParams;
use crate::services::auth::SessionTokens;
use crate::services::cookies::{STATE_COOKIE, STATE_COOKIE_PATH};
use crate::services::{auth, cookies};

/// `GET /api/auth/github` — redirect the browser to the provider's
/// authorization endpoint with a fresh anti-forgery state.
pub async fn github_start_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some((client_id, _, redirect_uri)) = state.config.github.credentials() else {
        return AppError::from(OAuthError::NotConfigured).into_response();
    };

    let authorize_url = match Url::parse(&state.config.github.authorize_url) {
        Ok(url) => url,
        Err(e) => {
            return AppError::Internal(format!("authorize url: {e}")).into_response();
        }
    };

    let anti_forgery = generate_state();
    state.oauth_states.insert(anti_forgery.clone());

    let mut url = authorize_url;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &state.config.github.scope)
        .append_pair("state", &anti_forgery)
        .append_pair("allow_signup", "true");

    state.oauth_observer.checkpoint(
        FlowStep::AuthorizationRequest,
        &[
            ("authz_endpoint", state.config.github.authorize_url.clone()),
            ("client_id", client_id.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("scope", state.config.github.scope.clone()),
            ("state", anti_forgery.clone()),
        ],
    );

    let jar = jar.add(cookies::state_cookie(&state.config, &anti_forgery));
    (jar, found(url.as_str())).into_response()
}

/// Plain `302 Found` redirect — the contract with the browser client.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// `GET /api/auth/github/callback` — complete the dance: validate state,
/// exchange the code, fetch the profile, map the account, start a session,
/// and bounce the browser back to the frontend.
pub async fn github_callback_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    match callback_flow(&state, &meta, &jar, &params).await {
        Ok(tokens) => {
            let jar = jar
                .add(cookies::clear_state_cookie(&state.config))
                .add(cookies::access_cookie(&state.config, &tokens.access_token))
                .add(cookies::refresh_cookie(&state.config, &tokens.refresh_token));
            (jar, found(&state.config.github.frontend_redirect_url)).into_response()
        }
        Err(err) => {
            let jar = jar.add(cookies::clear_state_cookie(&state.config));
            (jar, err).into_response()
        }
    }
}

async fn callback_flow(
    state: &AppState,
    meta: &RequestMeta,
    jar: &CookieJar,
    params: &OAuthCallbackParams,
) -> AppResult<SessionTokens> {
    let cfg = &state.config.github;
    let Some((client_id, client_secret, redirect_uri)) = cfg.credentials() else {
        return Err(OAuthError::NotConfigured.into());
    };

    let code = params.code.as_deref().unwrap_or_default();
    let returned_state = params.state.as_deref().unwrap_or_default();
    let cookie_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());

    // The state must match the cookie AND still be pending server-side;
    // `consume` removes it, so a replayed callback fails here.
    let state_ok = !code.is_empty()
        && !returned_state.is_empty()
        && cookie_state.as_deref() == Some(returned_state)
        && state.oauth_states.consume(returned_state);

    state.oauth_observer.checkpoint(
        FlowStep::AuthorizationGrant,
        &[
            ("callback_path", STATE_COOKIE_PATH.to_string()),
            ("code", code.to_string()),
            ("state", returned_state.to_string()),
            (
                "state_check",
                if state_ok { "OK" } else { "FAIL" }.to_string(),
            ),
        ],
    );
    if !state_ok {
        return Err(OAuthError::InvalidState.into());
    }

    state.oauth_observer.checkpoint(
        FlowStep::TokenRequest,
        &[("token_endpoint", cfg.token_url.clone())],
    );
    let token_response = github::exchange_authorization_code(
        &cfg.token_url,
        client_id,
        client_secret,
        code,
        redirect_uri,
    )
    .await?;

    let provider_token = token_response
        .access_token
        .ok_or_else(|| AppError::Validation("Token exchange failed".into()))?;
    state.oauth_observer.checkpoint(
        FlowStep::TokenResponse,
        &[
            ("token_len", provider_token.len().to_string()),
            ("scope", token_response.scope.unwrap_or_default()),
            ("token_type", token_response.token_type.unwrap_or_default()),
        ],
    );

    state.oauth_observer.checkpoint(
        FlowStep::FetchUser,
        &[("resource", cfg.user_api_url.clone())],
    );
    let gh_user = github::fetch_user(&cfg.user_api_url, &provider_token).await?;

    state.oauth_observer.checkpoint(
        FlowStep::UserProfile,
        &[
            (
                "github.id",
                gh_user.id.map(|id| id.to_string()).unwrap_or_default(),
            ),
            ("github.login", gh_user.login.clone().unwrap_or_default()),
            ("github.name", gh_user.name.clone().unwrap_or_default()),
            (
                "github.avatar_url",
                gh_user.avatar_url.clone().unwrap_or_default(),
            ),
        ],
    );

    let (_user, tokens) =
        auth::federated_login(&state.pool, &state.config, &gh_user, meta).await?;
    Ok(tokens)
}
