//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types in `shutter_api` (which carry the wire-format field names).

use serde::{Deserialize, Serialize};

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login_name: String,
    pub first_name: String,
    pub last_name: String,
    /// `user` or `admin`.
    pub role: String,
    /// `local`, `github`, or `admin`.
    pub auth_provider: String,
    /// Provider-scoped external identity. Present only for federated accounts.
    pub provider_user_id: Option<String>,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
}

/// User with password hash (for the login flow only).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: String,
}

/// Input for creating a federated account on first provider login.
#[derive(Debug, Clone)]
pub struct NewFederatedUser {
    pub login_name: String,
    /// bcrypt hash of a random placeholder secret. Never usable for login.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub auth_provider: String,
    pub provider_user_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
}

/// Refresh token record stored in the database.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub jti: String,
    pub family: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub replaced_by_token_hash: Option<String>,
}

/// Input for persisting a freshly issued refresh token.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: String,
    pub token_hash: String,
    pub jti: String,
    pub family: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub ip: String,
    pub user_agent: String,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject — user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Role claim. A cache of the store's role at issuance time; privilege
    /// elevation re-checks the store.
    pub role: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject — user ID.
    pub sub: String,
    /// Family shared by all tokens descended from one login event.
    pub family: String,
    /// Unique token identifier.
    pub jti: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}
