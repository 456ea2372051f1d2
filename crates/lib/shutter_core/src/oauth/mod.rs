//! GitHub OAuth federation support.
//!
//! Provides the authorization-code exchange client, the single-use
//! anti-forgery state store, and the flow audit observer.

pub mod audit;
pub mod github;
pub mod state;

use thiserror::Error;

/// OAuth flow errors.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth provider not configured")]
    NotConfigured,

    #[error("Invalid OAuth state")]
    InvalidState,

    #[error("Failed to exchange token: {0}")]
    ExchangeFailed(String),

    #[error("Invalid provider response: {0}")]
    InvalidProviderResponse(String),
}
