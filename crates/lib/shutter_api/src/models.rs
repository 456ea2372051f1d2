//! API request/response types.
//!
//! Field names are the wire contract with the browser client and use the
//! same snake_case shapes the frontend consumes.

use serde::{Deserialize, Serialize};

/// `POST /api/auth/login` request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /api/auth/register` request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Minimal user payload returned from login/register. Never carries the
/// password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: String,
    pub login_name: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

/// Login/register response.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserPayload,
    /// Present only when `RETURN_ACCESS_TOKEN_IN_BODY` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Acknowledgement body for logout/refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

/// `GET /api/auth/me` response — the current user's public profile.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub display_name: String,
    pub handle: String,
    pub avatar_url: String,
    pub auth_provider: String,
    pub role: String,
}

/// Query parameters delivered to the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// `GET /api/health` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_connected: bool,
}

/// Error body shared by all failure responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
