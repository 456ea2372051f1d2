//! GitHub authorization-code client.
//!
//! Server-to-server calls against the provider: code-for-token exchange and
//! the user-profile fetch. Both carry an explicit request timeout so a stalled
//! provider cannot hold a handler beyond one bounded round-trip.

use std::time::Duration;

use serde::Deserialize;

use super::OAuthError;

/// GitHub authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
/// GitHub code-for-token endpoint.
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// GitHub authenticated-user endpoint.
pub const USER_API_URL: &str = "https://api.github.com/user";

/// Upper bound on each provider round-trip.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// User-Agent for provider calls. GitHub rejects requests without one.
const USER_AGENT: &str = "shutter-app";

/// Response from the provider token endpoint.
#[derive(Debug, Deserialize)]
pub struct GithubTokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Provider user profile.
#[derive(Debug, Deserialize)]
pub struct GithubUser {
    pub id: Option<i64>,
    pub login: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

fn provider_client() -> Result<reqwest::Client, OAuthError> {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| OAuthError::ExchangeFailed(format!("http client: {e}")))
}

/// Exchange an authorization code for a provider access token.
pub async fn exchange_authorization_code(
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<GithubTokenResponse, OAuthError> {
    let client = provider_client()?;

    let params = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];

    let resp = client
        .post(token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&params)
        .send()
        .await
        .map_err(|e| OAuthError::ExchangeFailed(format!("token exchange: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        return Err(OAuthError::ExchangeFailed(format!(
            "token exchange HTTP {status}"
        )));
    }

    resp.json::<GithubTokenResponse>()
        .await
        .map_err(|e| OAuthError::InvalidProviderResponse(format!("token response: {e}")))
}

/// Fetch the provider user profile with an obtained access token.
pub async fn fetch_user(
    user_api_url: &str,
    access_token: &str,
) -> Result<GithubUser, OAuthError> {
    let client = provider_client()?;

    let resp = client
        .get(user_api_url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| OAuthError::InvalidProviderResponse(format!("user fetch: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        return Err(OAuthError::InvalidProviderResponse(format!(
            "user fetch HTTP {status}"
        )));
    }

    resp.json::<GithubUser>()
        .await
        .map_err(|e| OAuthError::InvalidProviderResponse(format!("user profile: {e}")))
}
