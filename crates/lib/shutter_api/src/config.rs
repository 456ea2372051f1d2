//! API server configuration.

use chrono::Duration;

use shutter_core::auth::jwt::resolve_token_secret;
use shutter_core::oauth::github;

/// Default access token lifetime: 15 minutes.
const DEFAULT_ACCESS_TTL_MS: i64 = 15 * 60 * 1000;

/// Default refresh token lifetime: 30 days.
const DEFAULT_REFRESH_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access token signing secret.
    pub access_token_secret: String,
    /// Refresh token signing secret (distinct from the access secret).
    pub refresh_token_secret: String,
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
    /// Production deployment flag. Controls the `Secure` cookie attribute.
    pub production: bool,
    /// Echo the access token in the login response body (for non-cookie clients).
    pub return_access_token_in_body: bool,
    /// GitHub OAuth provider settings.
    pub github: GithubConfig,
}

/// GitHub OAuth provider settings.
#[derive(Clone, Debug)]
pub struct GithubConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub user_api_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub frontend_redirect_url: String,
}

impl GithubConfig {
    /// Reads provider settings from environment variables. Endpoint URLs are
    /// the provider's fixed endpoints unless overridden (tests point them at
    /// a local stub).
    pub fn from_env() -> Self {
        Self {
            authorize_url: std::env::var("GITHUB_AUTHORIZE_URL")
                .unwrap_or_else(|_| github::AUTHORIZE_URL.into()),
            token_url: std::env::var("GITHUB_TOKEN_URL")
                .unwrap_or_else(|_| github::TOKEN_URL.into()),
            user_api_url: std::env::var("GITHUB_USER_API_URL")
                .unwrap_or_else(|_| github::USER_API_URL.into()),
            client_id: std::env::var("GITHUB_CLIENT_ID").ok().filter(|v| !v.is_empty()),
            client_secret: std::env::var("GITHUB_CLIENT_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            redirect_uri: std::env::var("GITHUB_REDIRECT_URI")
                .ok()
                .filter(|v| !v.is_empty()),
            scope: std::env::var("GITHUB_SCOPE").unwrap_or_else(|_| "read:user".into()),
            frontend_redirect_url: std::env::var("FRONTEND_REDIRECT_URL")
                .unwrap_or_else(|_| "http://localhost:3000/".into()),
        }
    }

    /// Returns (client_id, client_secret, redirect_uri) when the provider is
    /// fully configured.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        match (&self.client_id, &self.client_secret, &self.redirect_uri) {
            (Some(id), Some(secret), Some(uri)) => Some((id, secret, uri)),
            _ => None,
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                  | Default                                  |
    /// |---------------------------|------------------------------------------|
    /// | `BIND_ADDR`               | `127.0.0.1:3100`                         |
    /// | `DATABASE_URL`            | `postgres://localhost:5432/shutter`      |
    /// | `ACCESS_TOKEN_SECRET`     | generated & persisted to file            |
    /// | `REFRESH_TOKEN_SECRET`    | generated & persisted to file            |
    /// | `ACCESS_TOKEN_TTL`        | `15m` (milliseconds or `<n><s\|m\|h\|d>`) |
    /// | `REFRESH_TOKEN_TTL`       | `30d`                                    |
    /// | `APP_ENV`                 | `development`                            |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/shutter".into()),
            access_token_secret: resolve_token_secret("ACCESS_TOKEN_SECRET", "access-secret"),
            refresh_token_secret: resolve_token_secret("REFRESH_TOKEN_SECRET", "refresh-secret"),
            access_ttl: Duration::milliseconds(parse_duration_ms(
                std::env::var("ACCESS_TOKEN_TTL").ok().as_deref(),
                DEFAULT_ACCESS_TTL_MS,
            )),
            refresh_ttl: Duration::milliseconds(parse_duration_ms(
                std::env::var("REFRESH_TOKEN_TTL").ok().as_deref(),
                DEFAULT_REFRESH_TTL_MS,
            )),
            production: std::env::var("APP_ENV").as_deref() == Ok("production"),
            return_access_token_in_body: std::env::var("RETURN_ACCESS_TOKEN_IN_BODY").as_deref()
                == Ok("true"),
            github: GithubConfig::from_env(),
        }
    }
}

/// Parse a TTL override: a bare number is milliseconds, `<n><s|m|h|d>` is a
/// duration. Anything else falls back.
fn parse_duration_ms(value: Option<&str>, fallback_ms: i64) -> i64 {
    let Some(value) = value else {
        return fallback_ms;
    };
    let value = value.trim();
    if value.is_empty() {
        return fallback_ms;
    }
    if value.chars().all(|c| c.is_ascii_digit()) {
        return value.parse().unwrap_or(fallback_ms);
    }
    let Some(unit) = value.chars().last().filter(char::is_ascii) else {
        return fallback_ms;
    };
    let Ok(amount) = value[..value.len() - 1].parse::<i64>() else {
        return fallback_ms;
    };
    let multiplier = match unit.to_ascii_lowercase() {
        's' => 1000,
        'm' => 60 * 1000,
        'h' => 60 * 60 * 1000,
        'd' => 24 * 60 * 60 * 1000,
        _ => return fallback_ms,
    };
    amount * multiplier
}
