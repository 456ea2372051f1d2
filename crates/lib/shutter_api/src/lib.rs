//! # shutter_api
//!
//! HTTP API library for Shutter.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use shutter_core::oauth::audit::{FlowObserver, TracingObserver};
use shutter_core::oauth::state::OAuthStateStore;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, oauth};
use crate::middleware::rate_limit::{RateLimiter, REFRESH_MAX_PER_WINDOW, WINDOW};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub pool: PgPool,
    /// API configuration.
    pub config: ApiConfig,
    /// Pending OAuth anti-forgery states (single-use).
    pub oauth_states: Arc<OAuthStateStore>,
    /// Audit sink for the OAuth flow checkpoints.
    pub oauth_observer: Arc<dyn FlowObserver>,
    /// Fixed-window limiter guarding the refresh endpoint.
    pub refresh_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Builds state with the default observer and limiter settings.
    pub fn new(pool: PgPool, config: ApiConfig) -> Self {
        Self {
            pool,
            config,
            oauth_states: Arc::new(OAuthStateStore::new()),
            oauth_observer: Arc::new(TracingObserver),
            refresh_limiter: Arc::new(RateLimiter::new(WINDOW, REFRESH_MAX_PER_WINDOW)),
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `shutter_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    shutter_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/api/health", get(health::health_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/github", get(oauth::github_start_handler))
        .route(
            "/api/auth/github/callback",
            get(oauth::github_callback_handler),
        );

    // Refresh is public but throttled.
    let refresh = Router::new()
        .route("/api/auth/refresh", post(auth::refresh_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::limit_refresh,
        ));

    // Protected routes (require a valid access token)
    let protected = Router::new()
        .route("/api/auth/logout-all", post(auth::logout_all_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(refresh)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
