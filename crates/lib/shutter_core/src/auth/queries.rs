//! Auth-related database queries.
//!
//! All token-store mutations are single-row updates keyed by the unique
//! `token_hash` or by (user, family); the consume step is a compare-and-set
//! so concurrent rotations of the same token cannot both succeed.

use sqlx::PgPool;

use super::AuthError;
use crate::models::auth::{
    NewFederatedUser, NewRefreshToken, RefreshTokenRecord, User, UserWithPassword,
};
use crate::uuid::uuidv7;

/// Full user row as read from the database. Converted to the domain `User`
/// (which never carries the hash) at the query boundary.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    login_name: String,
    first_name: String,
    last_name: String,
    role: String,
    auth_provider: String,
    provider_user_id: Option<String>,
    display_name: Option<String>,
    handle: Option<String>,
    avatar_url: Option<String>,
    password_hash: String,
}

const USER_COLUMNS: &str = "id::text AS id, login_name, first_name, last_name, role, \
     auth_provider, provider_user_id, display_name, handle, avatar_url, password_hash";

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            login_name: self.login_name,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            auth_provider: self.auth_provider,
            provider_user_id: self.provider_user_id,
            display_name: self.display_name,
            handle: self.handle,
            avatar_url: self.avatar_url,
        }
    }
}

/// Fetch a user by login name, including the password hash.
pub async fn find_user_by_login_name(
    pool: &PgPool,
    login_name: &str,
) -> Result<Option<UserWithPassword>, AuthError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE login_name = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(login_name)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| {
        let password_hash = row.password_hash.clone();
        UserWithPassword {
            user: row.into_user(),
            password_hash,
        }
    }))
}

/// Fetch a user by provider identity — the federation key.
pub async fn find_user_by_provider(
    pool: &PgPool,
    auth_provider: &str,
    provider_user_id: &str,
) -> Result<Option<User>, AuthError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE auth_provider = $1 AND provider_user_id = $2"
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(auth_provider)
        .bind(provider_user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(UserRow::into_user))
}

/// Fetch a user by ID.
pub async fn get_user_by_id(pool: &PgPool, user_id: &str) -> Result<Option<User>, AuthError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1::uuid");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(UserRow::into_user))
}

/// Check whether a login name is already registered.
pub async fn login_name_exists(pool: &PgPool, login_name: &str) -> Result<bool, AuthError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE login_name = $1)")
            .bind(login_name)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Create a local account.
pub async fn create_local_user(
    pool: &PgPool,
    login_name: &str,
    password_hash: &str,
    first_name: &str,
    last_name: &str,
) -> Result<User, AuthError> {
    let sql = format!(
        "INSERT INTO users (login_name, password_hash, first_name, last_name) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(login_name)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(pool)
        .await?;
    Ok(row.into_user())
}

/// Create a federated account, or return the existing one if a concurrent
/// first login already created it.
///
/// The (auth_provider, provider_user_id) pair is enforced unique by a partial
/// index; a conflict means someone else won the race, so the row is simply
/// re-fetched.
pub async fn create_federated_user(
    pool: &PgPool,
    new_user: &NewFederatedUser,
) -> Result<User, AuthError> {
    sqlx::query(
        "INSERT INTO users (login_name, password_hash, first_name, last_name, auth_provider, \
                            provider_user_id, display_name, handle, avatar_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (auth_provider, provider_user_id) \
            WHERE provider_user_id IS NOT NULL DO NOTHING",
    )
    .bind(&new_user.login_name)
    .bind(&new_user.password_hash)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(&new_user.auth_provider)
    .bind(&new_user.provider_user_id)
    .bind(&new_user.display_name)
    .bind(&new_user.handle)
    .bind(&new_user.avatar_url)
    .execute(pool)
    .await?;

    find_user_by_provider(pool, &new_user.auth_provider, &new_user.provider_user_id)
        .await?
        .ok_or_else(|| {
            AuthError::Internal("federated user missing after insert".to_string())
        })
}

/// Persist a freshly issued refresh token record.
pub async fn store_refresh_token(
    pool: &PgPool,
    new_token: &NewRefreshToken,
) -> Result<(), AuthError> {
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, jti, family, expires_at, ip, user_agent) \
         VALUES ($1, $2::uuid, $3, $4, $5, $6, $7, $8)",
    )
    .bind(uuidv7())
    .bind(&new_token.user_id)
    .bind(&new_token.token_hash)
    .bind(&new_token.jti)
    .bind(&new_token.family)
    .bind(new_token.expires_at)
    .bind(&new_token.ip)
    .bind(&new_token.user_agent)
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up a refresh token record by fingerprint, revoked or not.
pub async fn find_refresh_token(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<RefreshTokenRecord>, AuthError> {
    let row = sqlx::query_as::<
        _,
        (
            String,
            String,
            String,
            String,
            String,
            chrono::DateTime<chrono::Utc>,
            Option<chrono::DateTime<chrono::Utc>>,
            Option<String>,
        ),
    >(
        "SELECT id::text, user_id::text, token_hash, jti, family, expires_at, revoked_at, \
                replaced_by_token_hash \
         FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(
        |(id, user_id, token_hash, jti, family, expires_at, revoked_at, replaced_by_token_hash)| {
            RefreshTokenRecord {
                id,
                user_id,
                token_hash,
                jti,
                family,
                expires_at,
                revoked_at,
                replaced_by_token_hash,
            }
        },
    ))
}

/// Atomically consume an active refresh token, linking it to its successor.
///
/// Returns `false` when the token was already revoked (or never existed) —
/// the caller must treat that as reuse. Only one of two concurrent callers
/// can observe `true`.
pub async fn consume_refresh_token(
    pool: &PgPool,
    token_hash: &str,
    replaced_by_token_hash: &str,
) -> Result<bool, AuthError> {
    let result = sqlx::query(
        "UPDATE refresh_tokens \
         SET revoked_at = now(), replaced_by_token_hash = $2 \
         WHERE token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(token_hash)
    .bind(replaced_by_token_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Revoke a refresh token by fingerprint (logout; best-effort).
pub async fn revoke_refresh_token_by_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = now() \
         WHERE token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(token_hash)
    .execute(pool)
    .await?;
    Ok(())
}

/// Revoke every active token in a user's family (reuse detection).
pub async fn revoke_family(pool: &PgPool, user_id: &str, family: &str) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = now() \
         WHERE user_id = $1::uuid AND family = $2 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .bind(family)
    .execute(pool)
    .await?;
    Ok(())
}

/// Revoke all refresh tokens for a user, across families (logout-all).
pub async fn revoke_all_refresh_tokens(pool: &PgPool, user_id: &str) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = now() \
         WHERE user_id = $1::uuid AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}
