//! Session service — login, rotation, revocation, and federated account
//! mapping.
//!
//! A login event starts a token *family*; every rotation stays inside it.
//! Redeeming a refresh token that is unknown or already consumed revokes the
//! whole family: once reuse is observed the legitimate holder and an attacker
//! are indistinguishable.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use shutter_core::auth::{jwt, password, queries};
use shutter_core::models::auth::{NewFederatedUser, NewRefreshToken, User};
use shutter_core::oauth::github::GithubUser;

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};
use crate::extract::RequestMeta;

/// A freshly minted credential pair, ready to be delivered via cookies.
#[derive(Debug)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issue an access/refresh pair for `user` within `family` and persist the
/// refresh record.
async fn issue_session(
    pool: &PgPool,
    config: &ApiConfig,
    user: &User,
    family: &str,
    meta: &RequestMeta,
) -> AppResult<SessionTokens> {
    let access_token = jwt::generate_access_token(
        &user.id,
        &user.role,
        config.access_token_secret.as_bytes(),
        config.access_ttl,
    )?;
    let issued = jwt::generate_refresh_token(
        &user.id,
        family,
        config.refresh_token_secret.as_bytes(),
        config.refresh_ttl,
    )?;

    queries::store_refresh_token(
        pool,
        &NewRefreshToken {
            user_id: user.id.clone(),
            token_hash: jwt::fingerprint(&issued.token),
            jti: issued.jti,
            family: family.to_string(),
            expires_at: issued.expires_at,
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
        },
    )
    .await?;

    Ok(SessionTokens {
        access_token,
        refresh_token: issued.token,
    })
}

/// Authenticate with login name + password and start a new token family.
pub async fn login(
    pool: &PgPool,
    config: &ApiConfig,
    login_name: &str,
    pass: &str,
    meta: &RequestMeta,
) -> AppResult<(User, SessionTokens)> {
    if login_name.is_empty() {
        return Err(AppError::Validation("login_name is required".into()));
    }

    let Some(found) = queries::find_user_by_login_name(pool, login_name).await? else {
        // Same message as a wrong password; no user enumeration.
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if pass.is_empty() || !password::verify_password(pass, &found.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    // A new login event always starts a new family.
    let family = Uuid::new_v4().to_string();
    let tokens = issue_session(pool, config, &found.user, &family, meta).await?;

    info!(user_id = %found.user.id, "login");
    Ok((found.user, tokens))
}

/// Register a local account, then start a session for it.
pub async fn register(
    pool: &PgPool,
    config: &ApiConfig,
    login_name: &str,
    pass: &str,
    first_name: &str,
    last_name: &str,
    meta: &RequestMeta,
) -> AppResult<(User, SessionTokens)> {
    if login_name.is_empty() {
        return Err(AppError::Validation("login_name is required".into()));
    }
    if pass.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Validation(
            "first_name and last_name are required".into(),
        ));
    }
    if queries::login_name_exists(pool, login_name).await? {
        return Err(AppError::Validation("login_name already taken".into()));
    }

    let hash = password::hash_password(pass)?;
    let user = queries::create_local_user(pool, login_name, &hash, first_name, last_name).await?;

    let family = Uuid::new_v4().to_string();
    let tokens = issue_session(pool, config, &user, &family, meta).await?;

    info!(user_id = %user.id, "registered");
    Ok((user, tokens))
}

/// Rotate a refresh token: consume the presented one exactly once and issue a
/// successor in the same family.
///
/// Any presentation of an unknown or already-consumed token revokes the whole
/// claimed family before failing.
pub async fn refresh(
    pool: &PgPool,
    config: &ApiConfig,
    raw_token: &str,
    meta: &RequestMeta,
) -> AppResult<SessionTokens> {
    let claims = jwt::verify_refresh_token(raw_token, config.refresh_token_secret.as_bytes())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    let token_hash = jwt::fingerprint(raw_token);
    let record = queries::find_refresh_token(pool, &token_hash).await?;

    let Some(record) = record.filter(|r| r.revoked_at.is_none()) else {
        // Unknown or already consumed: reuse. The signature checked out, so
        // the claimed family is trustworthy.
        warn!(user_id = %claims.sub, family = %claims.family, "refresh token reuse detected");
        queries::revoke_family(pool, &claims.sub, &claims.family).await?;
        return Err(AppError::Unauthorized("Unauthorized".into()));
    };

    // Sign the successor first so consuming the old record can link to it.
    let issued = jwt::generate_refresh_token(
        &record.user_id,
        &record.family,
        config.refresh_token_secret.as_bytes(),
        config.refresh_ttl,
    )?;
    let new_hash = jwt::fingerprint(&issued.token);

    if !queries::consume_refresh_token(pool, &token_hash, &new_hash).await? {
        // A concurrent rotation consumed it between lookup and update.
        warn!(user_id = %record.user_id, family = %record.family, "refresh token reuse detected");
        queries::revoke_family(pool, &record.user_id, &record.family).await?;
        return Err(AppError::Unauthorized("Unauthorized".into()));
    }

    let user = queries::get_user_by_id(pool, &record.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    let access_token = jwt::generate_access_token(
        &user.id,
        &user.role,
        config.access_token_secret.as_bytes(),
        config.access_ttl,
    )?;

    queries::store_refresh_token(
        pool,
        &NewRefreshToken {
            user_id: user.id.clone(),
            token_hash: new_hash,
            jti: issued.jti,
            family: record.family,
            expires_at: issued.expires_at,
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
        },
    )
    .await?;

    Ok(SessionTokens {
        access_token,
        refresh_token: issued.token,
    })
}

/// Revoke the presented refresh token, if any. Idempotent.
pub async fn logout(pool: &PgPool, raw_token: Option<&str>) -> AppResult<()> {
    if let Some(token) = raw_token {
        queries::revoke_refresh_token_by_hash(pool, &jwt::fingerprint(token)).await?;
    }
    Ok(())
}

/// Revoke every active refresh token for a user, across families.
pub async fn logout_all(pool: &PgPool, user_id: &str) -> AppResult<()> {
    queries::revoke_all_refresh_tokens(pool, user_id).await?;
    info!(user_id, "logout-all");
    Ok(())
}

/// Fetch the current user's public profile.
pub async fn me(pool: &PgPool, user_id: &str) -> AppResult<User> {
    queries::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Map a provider profile to a local user, creating the account on first
/// login, then start a session for it.
///
/// Existing accounts are reused unchanged; their local profile is not
/// refreshed from the provider.
pub async fn federated_login(
    pool: &PgPool,
    config: &ApiConfig,
    gh_user: &GithubUser,
    meta: &RequestMeta,
) -> AppResult<(User, SessionTokens)> {
    let (Some(provider_id), Some(login)) = (gh_user.id, gh_user.login.as_deref()) else {
        return Err(AppError::Validation("Invalid GitHub user profile".into()));
    };
    let provider_id = provider_id.to_string();

    let user = match queries::find_user_by_provider(pool, "github", &provider_id).await? {
        Some(user) => user,
        None => {
            let raw_name = gh_user.name.as_deref().unwrap_or("").trim().to_string();
            let mut parts = raw_name.split_whitespace();
            let first_name = parts
                .next()
                .map(str::to_string)
                .unwrap_or_else(|| login.to_string());
            let rest: Vec<&str> = parts.collect();
            let last_name = if rest.is_empty() {
                "GitHub".to_string()
            } else {
                rest.join(" ")
            };

            // Placeholder secret: random, hashed, never usable for login.
            let placeholder = password::hash_password(&Uuid::new_v4().to_string())?;
            let display_name = if raw_name.is_empty() {
                first_name.clone()
            } else {
                raw_name
            };

            let user = queries::create_federated_user(
                pool,
                &NewFederatedUser {
                    login_name: format!("gh_{provider_id}"),
                    password_hash: placeholder,
                    first_name,
                    last_name,
                    auth_provider: "github".to_string(),
                    provider_user_id: provider_id.clone(),
                    display_name: Some(display_name),
                    handle: Some(login.to_string()),
                    avatar_url: gh_user.avatar_url.clone(),
                },
            )
            .await?;
            info!(user_id = %user.id, handle = login, "created federated account");
            user
        }
    };

    let family = Uuid::new_v4().to_string();
    let tokens = issue_session(pool, config, &user, &family, meta).await?;

    info!(user_id = %user.id, provider = "github", "federated login");
    Ok((user, tokens))
}
