// Library exports for the API server, the create-user tool and tests
pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use config::Config;
use db::{accounts::AccountStore, audit_log::AuditStore, refresh_tokens::RefreshTokenStore};
use middleware::rate_limit::RateLimiter;
use services::{audit::AuditLog, auth::AuthService};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub audit: Arc<AuditLog>,
    /// `None` when rate limiting is disabled.
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    /// Wire the services together. Spawns the audit worker, so this must run
    /// inside a Tokio runtime.
    pub fn new(
        db: PgPool,
        config: Arc<Config>,
        accounts: Arc<dyn AccountStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(&config.auth, accounts, refresh_tokens));
        let audit = Arc::new(AuditLog::spawn(audit_store, config.audit_queue_capacity));
        let rate_limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limit)));

        Self {
            db,
            config,
            auth,
            audit,
            rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use crate::middleware::{auth::authenticate, rate_limit::limit_auth_requests, role, security::security_headers};

    let public_auth = Router::new()
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/logout", post(routes::auth::logout))
        .route_layer(from_fn_with_state(state.clone(), limit_auth_requests));

    let staff = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route_layer(from_fn(role::require_editor));

    // Deletion shares the path with read and update but needs super_admin.
    let delete_user = delete(routes::users::delete_user).route_layer(from_fn(role::require_super_admin));

    let admin = Router::new()
        .route("/admin/users", get(routes::users::list_users).post(routes::users::create_user))
        .route(
            "/admin/users/{id}",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .merge(delete_user),
        )
        .route("/admin/users/{id}/unlock", post(routes::users::unlock_user))
        .route("/admin/users/{id}/revoke-sessions", post(routes::users::revoke_sessions))
        .route_layer(from_fn(role::require_admin));

    // authenticate runs before any role gate.
    let protected = staff
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .nest("/api/v1", public_auth.merge(protected))
        .layer(from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::{to_bytes, Body},
        http::{header, HeaderMap, Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{
        config::test_config,
        db::memory::{MemoryAccountStore, MemoryAuditStore, MemoryRefreshTokenStore},
        models::user::{Account, UserRole},
    };

    struct TestApp {
        router: Router,
        state: AppState,
        accounts: Arc<MemoryAccountStore>,
        audit: Arc<MemoryAuditStore>,
    }

    fn test_app_with(config: Config) -> TestApp {
        let accounts = Arc::new(MemoryAccountStore::default());
        let tokens = Arc::new(MemoryRefreshTokenStore::default());
        let audit = Arc::new(MemoryAuditStore::default());
        // Never connects; only /health would touch it.
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();

        let state = AppState::new(db, Arc::new(config), accounts.clone(), tokens, audit.clone());
        TestApp {
            router: build_router(state.clone()),
            state,
            accounts,
            audit,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(test_config())
    }

    impl TestApp {
        fn seed(&self, email: &str, password: &str, role: UserRole) -> Uuid {
            let hash = bcrypt::hash(password, 4).unwrap();
            let account = Account::new(email, hash, "Staff Member", role);
            let id = account.id;
            self.accounts.insert(account);
            id
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, headers, body)
        }

        async fn login(&self, email: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
            self.send(json_request("POST", "/api/v1/auth/login", json!({ "email": email, "password": password })))
                .await
        }

        async fn access_token(&self, email: &str, password: &str) -> String {
            let (status, _, body) = self.login(email, password).await;
            assert_eq!(status, StatusCode::OK);
            body["access_token"].as_str().unwrap().to_string()
        }
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn authed_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
        let mut request = json_request(method, uri, body);
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        request
    }

    fn set_cookie(headers: &HeaderMap) -> String {
        headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn refresh_cookie_value(headers: &HeaderMap) -> String {
        set_cookie(headers)
            .split(';')
            .next()
            .and_then(|kv| kv.strip_prefix("refresh_token="))
            .unwrap()
            .to_string()
    }

    fn refresh_with_cookie(token: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .header(header::COOKIE, format!("refresh_token={token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_returns_profile() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let (status, headers, body) = app.login(" alice@example.com ", "correctpw").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert_eq!(body["user"]["role"], "editor");
        assert!(body.get("refresh_token").is_none());
        assert!(body["user"].get("password_hash").is_none());

        let cookie = set_cookie(&headers);
        assert!(cookie.starts_with("refresh_token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/api/v1/auth"));
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_login_keeps_email_case() {
        let app = test_app();
        app.seed("Alice.Smith@Example.com", "correctpw", UserRole::Editor);

        let (status, _, body) = app.login("Alice.Smith@Example.com", "correctpw").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "Alice.Smith@Example.com");

        let (status, _, _) = app.login("alice.smith@example.com", "correctpw").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_failures() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let (status, _, body) = app.login("alice@example.com", "wrongpw").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid email or password");

        let (status, _, body) = app.login("nobody@example.com", "correctpw").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid email or password");

        let (status, _, _) = app.login("", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.state.audit.shutdown().await;
        let entries = app.audit.entries.lock().unwrap();
        let failed: Vec<_> = entries.iter().filter(|e| e.action == "auth.login_failed").collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].user_email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_locked_account_rejected_over_http() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        for _ in 0..5 {
            app.login("alice@example.com", "wrongpw").await;
        }
        let (status, _, body) = app.login("alice@example.com", "correctpw").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("locked"));
    }

    #[tokio::test]
    async fn test_me_requires_valid_bearer() {
        let app = test_app();
        let id = app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let anonymous = Request::builder().uri("/api/v1/auth/me").body(Body::empty()).unwrap();
        let (status, _, body) = app.send(anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authentication required");

        let (status, _, body) = app.send(bearer("GET", "/api/v1/auth/me", "not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid or expired token");

        let token = app.access_token("alice@example.com", "correctpw").await;
        let (status, _, body) = app.send(bearer("GET", "/api/v1/auth/me", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.to_string());
        assert_eq!(body["role"], "editor");
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let (_, headers, _) = app.login("alice@example.com", "correctpw").await;
        let refresh = refresh_cookie_value(&headers);

        let (status, _, _) = app.send(bearer("GET", "/api/v1/auth/me", &refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_rotation_over_cookie() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let (_, headers, login) = app.login("alice@example.com", "correctpw").await;
        let first = refresh_cookie_value(&headers);

        let (status, headers, body) = app.send(refresh_with_cookie(&first)).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["access_token"], login["access_token"]);
        let second = refresh_cookie_value(&headers);
        assert_ne!(second, first);

        // Reuse of the rotated-out token is rejected and the cookie cleared.
        let (status, headers, body) = app.send(refresh_with_cookie(&first)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "refresh token has been revoked");
        assert!(set_cookie(&headers).contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_refresh_from_body_and_missing_token() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let (_, headers, _) = app.login("alice@example.com", "correctpw").await;
        let token = refresh_cookie_value(&headers);

        let (status, _, _) = app
            .send(json_request("POST", "/api/v1/auth/refresh", json!({ "refresh_token": token })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let empty = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = app.send(empty).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_always_succeeds() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let bare = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = app.send(bare).await;
        assert_eq!(status, StatusCode::OK);
        assert!(set_cookie(&headers).contains("Max-Age=0"));

        let (_, headers, _) = app.login("alice@example.com", "correctpw").await;
        let token = refresh_cookie_value(&headers);
        let logout = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .header(header::COOKIE, format!("refresh_token={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = app.send(logout).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = app.send(refresh_with_cookie(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        app.state.audit.shutdown().await;
        let entries = app.audit.entries.lock().unwrap();
        assert!(entries.iter().any(|e| e.action == "auth.logout"));
    }

    #[tokio::test]
    async fn test_change_password_over_http() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);
        let token = app.access_token("alice@example.com", "correctpw").await;

        let request = |current: &str, new: &str| {
            let mut req = json_request(
                "POST",
                "/api/v1/auth/change-password",
                json!({ "current_password": current, "new_password": new }),
            );
            req.headers_mut()
                .insert(header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
            req
        };

        let (status, _, body) = app.send(request("wrongpw", "newpassword")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "current password is incorrect");

        let (status, _, _) = app.send(request("correctpw", "short")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, headers, _) = app.send(request("correctpw", "newpassword")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(set_cookie(&headers).contains("Max-Age=0"));

        let (status, _, _) = app.login("alice@example.com", "newpassword").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_enforce_roles() {
        let app = test_app();
        app.seed("editor@example.com", "correctpw", UserRole::Editor);
        app.seed("admin@example.com", "correctpw", UserRole::Admin);
        let target = app.seed("target@example.com", "correctpw", UserRole::Editor);

        let unlock = format!("/api/v1/admin/users/{target}/unlock");
        let editor = app.access_token("editor@example.com", "correctpw").await;
        let (status, _, body) = app.send(bearer("POST", &unlock, &editor)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "insufficient permissions");

        let (status, _, _) = app.send(bearer("POST", &unlock, "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut locked = app.accounts.get(target);
        locked.failed_attempts = 5;
        locked.locked_until = Some(Utc::now() + Duration::minutes(15));
        app.accounts.insert(locked);

        let admin = app.access_token("admin@example.com", "correctpw").await;
        let (status, _, _) = app.send(bearer("POST", &unlock, &admin)).await;
        assert_eq!(status, StatusCode::OK);
        let unlocked = app.accounts.get(target);
        assert_eq!(unlocked.failed_attempts, 0);
        assert_eq!(unlocked.locked_until, None);

        // Deletion needs super_admin.
        let delete_uri = format!("/api/v1/admin/users/{target}");
        let (status, _, _) = app.send(bearer("DELETE", &delete_uri, &admin)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let missing = format!("/api/v1/admin/users/{}/unlock", Uuid::new_v4());
        let (status, _, body) = app.send(bearer("POST", &missing, &admin)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user not found");
    }

    #[tokio::test]
    async fn test_super_admin_deletes_and_revokes() {
        let app = test_app();
        let root = app.seed("root@example.com", "correctpw", UserRole::SuperAdmin);
        let target = app.seed("target@example.com", "correctpw", UserRole::Editor);

        let (_, headers, _) = app.login("target@example.com", "correctpw").await;
        let target_refresh = refresh_cookie_value(&headers);

        let token = app.access_token("root@example.com", "correctpw").await;
        let (status, _, _) = app
            .send(bearer("DELETE", &format!("/api/v1/admin/users/{target}"), &token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.accounts.get(target).deleted_at.is_some());

        let (status, _, _) = app.send(refresh_with_cookie(&target_refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = app.login("target@example.com", "correctpw").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = app
            .send(bearer("DELETE", &format!("/api/v1/admin/users/{root}"), &token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_creates_and_lists_users() {
        let app = test_app();
        app.seed("editor@example.com", "correctpw", UserRole::Editor);
        app.seed("admin@example.com", "correctpw", UserRole::Admin);
        let admin = app.access_token("admin@example.com", "correctpw").await;

        let new_user = json!({
            "email": "Writer@Example.com",
            "password": "writerpass",
            "full_name": "Wendy Writer",
            "role": "editor",
        });
        let (status, _, body) = app
            .send(authed_json("POST", "/api/v1/admin/users", &admin, new_user.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "Writer@Example.com");
        assert_eq!(body["status"], "active");
        assert!(body.get("password_hash").is_none());
        let id = body["id"].as_str().unwrap().to_string();

        let (status, _, body) = app
            .send(authed_json("POST", "/api/v1/admin/users", &admin, new_user))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "a user with this email already exists");

        let (status, _, _) = app.login("Writer@Example.com", "writerpass").await;
        assert_eq!(status, StatusCode::OK);

        // An admin cannot mint a super_admin.
        let escalate = json!({
            "email": "boss@example.com",
            "password": "bosspass1",
            "full_name": "Boss",
            "role": "super_admin",
        });
        let (status, _, _) = app
            .send(authed_json("POST", "/api/v1/admin/users", &admin, escalate))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let short = json!({
            "email": "short@example.com",
            "password": "short",
            "full_name": "Shorty",
            "role": "editor",
        });
        let (status, _, _) = app
            .send(authed_json("POST", "/api/v1/admin/users", &admin, short))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = app
            .send(bearer("GET", "/api/v1/admin/users?search=writer&per_page=10", &admin))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["per_page"], 10);
        assert_eq!(body["data"][0]["id"], id);

        let (status, _, body) = app.send(bearer("GET", "/api/v1/admin/users?role=admin", &admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["email"], "admin@example.com");

        let (status, _, body) = app.send(bearer("GET", &format!("/api/v1/admin/users/{id}"), &admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["full_name"], "Wendy Writer");

        let editor = app.access_token("editor@example.com", "correctpw").await;
        let (status, _, _) = app.send(bearer("GET", "/api/v1/admin/users", &editor)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        app.state.audit.shutdown().await;
        let entries = app.audit.entries.lock().unwrap();
        assert_eq!(entries.iter().filter(|e| e.action == "user.created").count(), 1);
    }

    #[tokio::test]
    async fn test_admin_role_and_status_changes_take_effect_on_refresh() {
        let app = test_app();
        let admin_id = app.seed("admin@example.com", "correctpw", UserRole::Admin);
        let target = app.seed("target@example.com", "correctpw", UserRole::Editor);
        let admin = app.access_token("admin@example.com", "correctpw").await;
        let user_uri = format!("/api/v1/admin/users/{target}");

        let (_, headers, _) = app.login("target@example.com", "correctpw").await;
        let refresh = refresh_cookie_value(&headers);

        let (status, _, body) = app
            .send(authed_json("PUT", &user_uri, &admin, json!({ "role": "admin", "full_name": "Promoted" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "admin");
        assert_eq!(app.accounts.get(target).full_name, "Promoted");

        // The next refresh carries the new role.
        let (status, headers, body) = app.send(refresh_with_cookie(&refresh)).await;
        assert_eq!(status, StatusCode::OK);
        let promoted = body["access_token"].as_str().unwrap().to_string();
        let refresh = refresh_cookie_value(&headers);
        let (status, _, _) = app.send(bearer("GET", "/api/v1/admin/users", &promoted)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = app
            .send(authed_json("PUT", &user_uri, &admin, json!({ "status": "suspended" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, headers, body) = app.send(refresh_with_cookie(&refresh)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "account is inactive");
        assert!(set_cookie(&headers).contains("Max-Age=0"));
        let (status, _, _) = app.login("target@example.com", "correctpw").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let own_uri = format!("/api/v1/admin/users/{admin_id}");
        let (status, _, _) = app
            .send(authed_json("PUT", &own_uri, &admin, json!({ "role": "editor" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = app
            .send(authed_json("PUT", &user_uri, &admin, json!({ "role": "super_admin" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let missing = format!("/api/v1/admin/users/{}", Uuid::new_v4());
        let (status, _, _) = app
            .send(authed_json("PUT", &missing, &admin, json!({ "full_name": "Nobody" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.state.audit.shutdown().await;
        let entries = app.audit.entries.lock().unwrap();
        assert_eq!(entries.iter().filter(|e| e.action == "user.updated").count(), 2);
    }

    #[tokio::test]
    async fn test_auth_rate_limit() {
        let mut config = test_config();
        config.rate_limit.enabled = true;
        config.rate_limit.auth_requests = 2;
        config.rate_limit.window_seconds = 30;
        let config_window = config.rate_limit.window_seconds;
        let app = test_app_with(config);
        app.seed("alice@example.com", "correctpw", UserRole::Editor);

        let attempt = || {
            let mut req = json_request(
                "POST",
                "/api/v1/auth/login",
                json!({ "email": "alice@example.com", "password": "wrongpw" }),
            );
            req.headers_mut().insert("x-real-ip", "198.51.100.20".parse().unwrap());
            req
        };

        assert_eq!(app.send(attempt()).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(app.send(attempt()).await.0, StatusCode::UNAUTHORIZED);
        let (status, headers, _) = app.send(attempt()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!((1..=config_window).contains(&retry_after), "retry_after={retry_after}");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_auth_counters() {
        let app = test_app();
        app.seed("alice@example.com", "correctpw", UserRole::Editor);
        app.login("alice@example.com", "correctpw").await;

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
        assert!(text.contains("auth_logins_total"));
    }
}
