//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Upstream failure: {0}")]
    UpstreamFailed(String),

    /// Deployment misconfiguration (e.g. OAuth provider without credentials).
    /// Unlike `Internal`, the message is safe to surface.
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                "Too many requests",
            ),
            AppError::UpstreamFailed(m) => (StatusCode::BAD_GATEWAY, "upstream_failed", m.as_str()),
            AppError::Misconfigured(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "misconfigured", m.as_str())
            }
            AppError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<shutter_core::auth::AuthError> for AppError {
    fn from(e: shutter_core::auth::AuthError) -> Self {
        use shutter_core::auth::AuthError;
        match e {
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::TokenError(msg) => AppError::Unauthorized(msg),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::DbError(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<shutter_core::oauth::OAuthError> for AppError {
    fn from(e: shutter_core::oauth::OAuthError) -> Self {
        use shutter_core::oauth::OAuthError;
        match e {
            OAuthError::NotConfigured => {
                AppError::Misconfigured("GitHub OAuth not configured".into())
            }
            OAuthError::InvalidState => AppError::Validation("Invalid OAuth state".into()),
            OAuthError::ExchangeFailed(detail) => {
                tracing::warn!(detail = %detail, "provider token exchange failed");
                AppError::UpstreamFailed("Failed to exchange token".into())
            }
            OAuthError::InvalidProviderResponse(detail) => {
                tracing::warn!(detail = %detail, "invalid provider response");
                AppError::Validation("Invalid provider response".into())
            }
        }
    }
}
