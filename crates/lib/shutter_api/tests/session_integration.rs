//! Integration tests — the full session lifecycle against an ephemeral
//! PostgreSQL instance: login, rotation, reuse detection, logout, and the
//! GitHub federation dance (against a stub provider).
//!
//! Tests skip (with a note on stderr) when no PostgreSQL toolchain is on
//! PATH, since the sidecar manager needs `pg_config`.

use std::collections::HashMap;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use shutter_api::AppState;
use shutter_api::config::{ApiConfig, GithubConfig};
use shutter_core::auth::jwt;
use shutter_core::db::{DbError, DbManager};

struct TestServer {
    db: DbManager,
    pool: sqlx::PgPool,
    state: AppState,
    app: Router,
}

fn unconfigured_github() -> GithubConfig {
    GithubConfig {
        authorize_url: "https://github.com/login/oauth/authorize".into(),
        token_url: "https://github.com/login/oauth/access_token".into(),
        user_api_url: "https://api.github.com/user".into(),
        client_id: None,
        client_secret: None,
        redirect_uri: None,
        scope: "read:user".into(),
        frontend_redirect_url: "http://localhost:3000/".into(),
    }
}

fn test_config(database_url: String, github: GithubConfig) -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url,
        access_token_secret: "test-access-secret".into(),
        refresh_token_secret: "test-refresh-secret".into(),
        access_ttl: chrono::Duration::minutes(15),
        refresh_ttl: chrono::Duration::days(30),
        production: false,
        return_access_token_in_body: false,
        github,
    }
}

/// Spin up an ephemeral PostgreSQL, migrate, and build the router.
/// Returns `None` (skip) when the host has no PostgreSQL toolchain.
async fn start(github: Option<GithubConfig>) -> Option<TestServer> {
    let mut db = match DbManager::ephemeral().await {
        Ok(db) => db,
        Err(DbError::PgConfigNotFound) => {
            eprintln!("skipping: pg_config not found on PATH");
            return None;
        }
        Err(e) => panic!("ephemeral db: {e}"),
    };
    db.setup().await.expect("db setup");
    db.start().await.expect("db start");

    let pool = sqlx::PgPool::connect(&db.connection_url())
        .await
        .expect("connect to ephemeral PG");
    shutter_api::migrate(&pool).await.expect("migrate");

    let config = test_config(db.connection_url(), github.unwrap_or_else(unconfigured_github));
    let state = AppState::new(pool.clone(), config);
    let app = shutter_api::router(state.clone());

    Some(TestServer {
        db,
        pool,
        state,
        app,
    })
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.expect("request")
}

fn post_json(uri: &str, body: Value, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_empty(uri: &str, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

fn get(uri: &str, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

/// Collect `Set-Cookie` headers into name → value pairs.
fn set_cookies(resp: &Response) -> HashMap<String, String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|nv| nv.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .collect()
}

async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

/// (revoked_at, replaced_by_token_hash, family) for a stored token.
async fn token_row(
    pool: &sqlx::PgPool,
    token_hash: &str,
) -> (
    Option<chrono::DateTime<chrono::Utc>>,
    Option<String>,
    String,
) {
    sqlx::query_as(
        "SELECT revoked_at, replaced_by_token_hash, family \
         FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_one(pool)
    .await
    .expect("token record")
}

async fn active_tokens_in_family(pool: &sqlx::PgPool, family: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM refresh_tokens WHERE family = $1 AND revoked_at IS NULL",
    )
    .bind(family)
    .fetch_one(pool)
    .await
    .expect("count")
}

async fn register(app: &Router, login_name: &str, password: &str) -> Value {
    let resp = send(
        app,
        post_json(
            "/api/auth/register",
            json!({
                "login_name": login_name,
                "password": password,
                "first_name": "Alice",
                "last_name": "Tester",
            }),
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

async fn login(app: &Router, login_name: &str, password: &str) -> (Value, HashMap<String, String>) {
    let resp = send(
        app,
        post_json(
            "/api/auth/login",
            json!({ "login_name": login_name, "password": password }),
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = set_cookies(&resp);
    (body_json(resp).await, cookies)
}

#[tokio::test]
async fn login_rotation_and_family_reuse_detection() {
    let Some(mut srv) = start(None).await else {
        return;
    };

    register(&srv.app, "alice", "correct-horse").await;

    // Login: profile comes back, both session cookies are set.
    let (body, cookies) = login(&srv.app, "alice", "correct-horse").await;
    assert_eq!(body["user"]["login_name"], "alice");
    assert!(body["user"]["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(body["user"]["role"], "user");
    assert!(body.get("token").is_none(), "token only echoed when configured");
    let first_refresh = cookies.get("refresh_token").expect("refresh cookie").clone();
    assert!(!cookies.get("access_token").expect("access cookie").is_empty());

    // Wrong password and unknown user fail alike.
    let resp = send(
        &srv.app,
        post_json(
            "/api/auth/login",
            json!({ "login_name": "alice", "password": "wrong-password" }),
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = send(
        &srv.app,
        post_json(
            "/api/auth/login",
            json!({ "login_name": "nobody", "password": "wrong-password" }),
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Missing login_name is a validation error, not an auth failure.
    let resp = send(
        &srv.app,
        post_json("/api/auth/login", json!({ "password": "x" }), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Rotation: the old record is consumed and linked to its successor.
    let resp = send(
        &srv.app,
        post_empty(
            "/api/auth/refresh",
            Some(&format!("refresh_token={first_refresh}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated = set_cookies(&resp);
    let second_refresh = rotated.get("refresh_token").expect("rotated cookie").clone();
    assert_ne!(first_refresh, second_refresh);

    let first_hash = jwt::fingerprint(&first_refresh);
    let second_hash = jwt::fingerprint(&second_refresh);
    let (revoked_at, replaced_by, family) = token_row(&srv.pool, &first_hash).await;
    assert!(revoked_at.is_some(), "consumed record is revoked");
    assert_eq!(replaced_by.as_deref(), Some(second_hash.as_str()));

    // Family continuity: the successor carries the same family, and it is the
    // only active record.
    let (second_revoked, _, second_family) = token_row(&srv.pool, &second_hash).await;
    assert!(second_revoked.is_none());
    assert_eq!(family, second_family);
    assert_eq!(active_tokens_in_family(&srv.pool, &family).await, 1);

    // Reuse: replaying the consumed token kills the whole family.
    let resp = send(
        &srv.app,
        post_empty(
            "/api/auth/refresh",
            Some(&format!("refresh_token={first_refresh}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(active_tokens_in_family(&srv.pool, &family).await, 0);

    // The rotated-but-never-used successor is dead too.
    let resp = send(
        &srv.app,
        post_empty(
            "/api/auth/refresh",
            Some(&format!("refresh_token={second_refresh}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // A garbage token never reaches the store.
    let resp = send(
        &srv.app,
        post_empty("/api/auth/refresh", Some("refresh_token=not-a-jwt")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // No cookie at all.
    let resp = send(&srv.app, post_empty("/api/auth/refresh", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    srv.db.stop().await.expect("db stop");
}

#[tokio::test]
async fn logout_me_and_cross_family_isolation() {
    let Some(mut srv) = start(None).await else {
        return;
    };

    register(&srv.app, "bob", "hunter2hunter2").await;

    // Two logins: two independent families.
    let (_, session_a) = login(&srv.app, "bob", "hunter2hunter2").await;
    let (_, session_b) = login(&srv.app, "bob", "hunter2hunter2").await;
    let refresh_a = session_a.get("refresh_token").unwrap().clone();
    let refresh_b = session_b.get("refresh_token").unwrap().clone();
    let family_a = token_row(&srv.pool, &jwt::fingerprint(&refresh_a)).await.2;
    let family_b = token_row(&srv.pool, &jwt::fingerprint(&refresh_b)).await.2;
    assert_ne!(family_a, family_b);

    // Kill family A via reuse: rotate once, then replay the consumed token.
    let resp = send(
        &srv.app,
        post_empty(
            "/api/auth/refresh",
            Some(&format!("refresh_token={refresh_a}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(
        &srv.app,
        post_empty(
            "/api/auth/refresh",
            Some(&format!("refresh_token={refresh_a}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(active_tokens_in_family(&srv.pool, &family_a).await, 0);

    // Family B is untouched and still rotates.
    assert_eq!(active_tokens_in_family(&srv.pool, &family_b).await, 1);
    let resp = send(
        &srv.app,
        post_empty(
            "/api/auth/refresh",
            Some(&format!("refresh_token={refresh_b}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Logout is idempotent, with or without a refresh cookie.
    let cookie = format!("refresh_token={refresh_b}");
    let resp = send(&srv.app, post_empty("/api/auth/logout", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&srv.app, post_empty("/api/auth/logout", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&srv.app, post_empty("/api/auth/logout", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    // Logout clears both session cookies.
    let cleared = set_cookies(&resp);
    assert_eq!(cleared.get("access_token").map(String::as_str), Some(""));
    assert_eq!(cleared.get("refresh_token").map(String::as_str), Some(""));

    // /me requires a valid access token and returns the public profile.
    let resp = send(&srv.app, get("/api/auth/me", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let (_, session) = login(&srv.app, "bob", "hunter2hunter2").await;
    let access = session.get("access_token").unwrap().clone();
    let auth_cookie = format!("access_token={access}");
    let resp = send(&srv.app, get("/api/auth/me", Some(&auth_cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["auth_provider"], "local");
    assert_eq!(body["role"], "user");

    // The bearer-header path works too.
    let req = Request::builder()
        .method("GET")
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let resp = send(&srv.app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // logout-all revokes everything for the user, across families.
    let resp = send(&srv.app, post_empty("/api/auth/logout-all", Some(&auth_cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM refresh_tokens rt \
         JOIN users u ON u.id = rt.user_id \
         WHERE u.login_name = 'bob' AND rt.revoked_at IS NULL",
    )
    .fetch_one(&srv.pool)
    .await
    .expect("count");
    assert_eq!(active, 0);

    // logout-all without credentials is rejected.
    let resp = send(&srv.app, post_empty("/api/auth/logout-all", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    srv.db.stop().await.expect("db stop");
}

#[tokio::test]
async fn refresh_endpoint_is_rate_limited() {
    let Some(mut srv) = start(None).await else {
        return;
    };

    // While we are here: the health probe sees the database.
    let resp = send(&srv.app, get("/api/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_connected"], true);

    // 10 requests per window per caller+path; the 11th is throttled.
    for _ in 0..10 {
        let resp = send(&srv.app, post_empty("/api/auth/refresh", None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = send(&srv.app, post_empty("/api/auth/refresh", None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    srv.db.stop().await.expect("db stop");
}

#[tokio::test]
async fn admin_elevation_rechecks_the_store() {
    use shutter_api::middleware::auth::{require_admin, require_auth};

    let Some(mut srv) = start(None).await else {
        return;
    };

    // A probe route gated the way elevated-privilege surfaces are: identity
    // extraction first, then the admin check.
    let admin_app: Router = Router::new()
        .route(
            "/api/admin/ping",
            axum::routing::get(|| async { "pong" }),
        )
        .layer(axum::middleware::from_fn_with_state(
            srv.state.clone(),
            require_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            srv.state.clone(),
            require_auth,
        ));

    register(&srv.app, "carol", "password-123").await;
    let (_, session) = login(&srv.app, "carol", "password-123").await;
    let access = session.get("access_token").unwrap().clone();
    let cookie = format!("access_token={access}");

    // No credentials at all: the request never reaches the handler.
    let resp = send(&admin_app, get("/api/admin/ping", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Authenticated but not admin.
    let resp = send(&admin_app, get("/api/admin/ping", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Promote in the store. The already-issued token still claims `user`,
    // but the store is authoritative for elevation.
    sqlx::query("UPDATE users SET role = 'admin' WHERE login_name = 'carol'")
        .execute(&srv.pool)
        .await
        .expect("promote");
    let resp = send(&admin_app, get("/api/admin/ping", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // A fresh login embeds the admin role claim directly.
    let (body, session) = login(&srv.app, "carol", "password-123").await;
    assert_eq!(body["user"]["role"], "admin");
    let access = session.get("access_token").unwrap().clone();
    let resp = send(
        &admin_app,
        get("/api/admin/ping", Some(&format!("access_token={access}"))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    srv.db.stop().await.expect("db stop");
}

/// Stub provider: answers the token exchange and the user-profile fetch.
async fn spawn_stub_provider() -> String {
    use axum::routing::{get as axum_get, post as axum_post};

    let stub = Router::new()
        .route(
            "/token",
            axum_post(|| async {
                axum::Json(json!({
                    "access_token": "stub-provider-token",
                    "token_type": "bearer",
                    "scope": "read:user",
                }))
            }),
        )
        .route(
            "/user",
            axum_get(|| async {
                axum::Json(json!({
                    "id": 4242,
                    "login": "octo",
                    "name": "Octo Cat",
                    "avatar_url": "https://avatars.example/octo.png",
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub provider");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, stub).await.expect("stub provider");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn github_flow_state_binding_and_account_mapping() {
    let provider = spawn_stub_provider().await;
    let github = GithubConfig {
        authorize_url: "https://github.com/login/oauth/authorize".into(),
        token_url: format!("{provider}/token"),
        user_api_url: format!("{provider}/user"),
        client_id: Some("test-client-id".into()),
        client_secret: Some("test-client-secret".into()),
        redirect_uri: Some("http://localhost:3100/api/auth/github/callback".into()),
        scope: "read:user".into(),
        frontend_redirect_url: "http://localhost:3000/welcome".into(),
    };
    let Some(mut srv) = start(Some(github)).await else {
        return;
    };

    // Authorization request: 302 to the provider with a state cookie.
    let resp = send(&srv.app, get("/api/auth/github", None)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("https://github.com/login/oauth/authorize"));
    assert!(location.contains("client_id=test-client-id"));
    let state = set_cookies(&resp)
        .get("oauth_state")
        .expect("state cookie")
        .clone();
    assert!(location.contains(&format!("state={state}")));

    // State mismatch is rejected regardless of the code.
    let resp = send(
        &srv.app,
        get(
            "/api/auth/github/callback?code=good-code&state=forged",
            Some(&format!("oauth_state={state}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    // Every exit clears the state cookie.
    assert_eq!(set_cookies(&resp).get("oauth_state").map(String::as_str), Some(""));

    // Missing code is rejected.
    let resp = send(
        &srv.app,
        get(
            &format!("/api/auth/github/callback?state={state}"),
            Some(&format!("oauth_state={state}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // A fresh dance succeeds end to end: first federated login creates the
    // local account and redirects to the frontend with session cookies.
    let resp = send(&srv.app, get("/api/auth/github", None)).await;
    let state = set_cookies(&resp).get("oauth_state").unwrap().clone();
    let callback = format!("/api/auth/github/callback?code=good-code&state={state}");
    let cookie = format!("oauth_state={state}");

    let resp = send(&srv.app, get(&callback, Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers()[header::LOCATION].to_str().unwrap(),
        "http://localhost:3000/welcome"
    );
    let session = set_cookies(&resp);
    assert!(!session.get("access_token").expect("access cookie").is_empty());
    assert!(!session.get("refresh_token").expect("refresh cookie").is_empty());

    // Replaying the same callback fails: the state was consumed server-side
    // even though the browser still holds a valid-looking cookie.
    let resp = send(&srv.app, get(&callback, Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The mapped account is the federation key, not the display name.
    let (login_name, provider_id, handle): (String, Option<String>, Option<String>) =
        sqlx::query_as(
            "SELECT login_name, provider_user_id, handle FROM users \
             WHERE auth_provider = 'github'",
        )
        .fetch_one(&srv.pool)
        .await
        .expect("federated user");
    assert_eq!(login_name, "gh_4242");
    assert_eq!(provider_id.as_deref(), Some("4242"));
    assert_eq!(handle.as_deref(), Some("octo"));

    // A second dance reuses the account instead of duplicating it.
    let resp = send(&srv.app, get("/api/auth/github", None)).await;
    let state = set_cookies(&resp).get("oauth_state").unwrap().clone();
    let resp = send(
        &srv.app,
        get(
            &format!("/api/auth/github/callback?code=good-code&state={state}"),
            Some(&format!("oauth_state={state}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let federated: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE auth_provider = 'github'")
            .fetch_one(&srv.pool)
            .await
            .expect("count");
    assert_eq!(federated, 1);

    // The federated session is a first-class session: /me works.
    let access = session.get("access_token").unwrap().clone();
    let resp = send(
        &srv.app,
        get("/api/auth/me", Some(&format!("access_token={access}"))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["handle"], "octo");
    assert_eq!(body["auth_provider"], "github");

    srv.db.stop().await.expect("db stop");
}

#[tokio::test]
async fn github_start_fails_fast_when_unconfigured() {
    let Some(mut srv) = start(None).await else {
        return;
    };

    let resp = send(&srv.app, get("/api/auth/github", None)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "GitHub OAuth not configured");

    srv.db.stop().await.expect("db stop");
}
