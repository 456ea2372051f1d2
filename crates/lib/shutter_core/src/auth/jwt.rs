//! JWT token generation and verification.
//!
//! Access tokens are short-lived and self-contained; refresh tokens carry a
//! `family` and `jti` and are tracked server-side by their fingerprint.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::info;

use super::AuthError;
use crate::models::auth::{AccessClaims, RefreshClaims};

/// A freshly signed refresh token together with the payload fields that must
/// be persisted alongside its record.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a signed JWT access token (HS256).
pub fn generate_access_token(
    user_id: &str,
    role: &str,
    secret: &[u8],
    ttl: Duration,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// Verify a JWT access token, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<AccessClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<AccessClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Generate a signed JWT refresh token (HS256) carrying the family and a
/// fresh `jti`.
///
/// The returned `jti` and `expires_at` are exactly what the signed payload
/// asserts; the caller persists them with the token record. A signing failure
/// indicates broken configuration and is not recoverable.
pub fn generate_refresh_token(
    user_id: &str,
    family: &str,
    secret: &[u8],
    ttl: Duration,
) -> Result<IssuedRefreshToken, AuthError> {
    let now = Utc::now();
    let expires_at = now + ttl;
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        family: family.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Internal(format!("refresh token signing: {e}")))?;
    Ok(IssuedRefreshToken {
        token,
        jti: claims.jti,
        expires_at,
    })
}

/// Verify a JWT refresh token, returning the claims on success.
pub fn verify_refresh_token(token: &str, secret: &[u8]) -> Option<RefreshClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<RefreshClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Deterministic one-way fingerprint of a serialized token (SHA-256, hex).
///
/// Used as the storage lookup key; the raw token is never stored.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve a signing secret: the named env var, falling back to a generated
/// 64-char secret persisted under the platform data directory.
pub fn resolve_token_secret(env_var: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(env_var)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = token_secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new token signing secret");
    secret
}

/// Path to a persisted signing secret file.
fn token_secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shutter")
        .join(file_name)
}
