use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    config::CookieConfig,
    errors::AuthError,
    middleware::client::ClientMeta,
    models::{
        auth::AuthenticatedUser,
        user::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshResponse, RefreshTokenRequest, UserProfile},
    },
    services::{
        audit::AuditEntry,
        auth::ClientInfo,
        metrics::{outcome_label, LOGINS_COUNTER, REFRESHES_COUNTER},
    },
    AppState,
};

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";
const MIN_PASSWORD_LEN: usize = 8;
// bcrypt ignores everything past 72 bytes.
const MAX_PASSWORD_LEN: usize = 72;

/// Extract a named cookie value from request headers.
fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(&prefix).map(str::to_string))
        .filter(|v| !v.is_empty())
}

fn cookie_header(config: &CookieConfig, value: &str, max_age: i64) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={value}; HttpOnly; Path={REFRESH_COOKIE_PATH}; Max-Age={max_age}; SameSite={}",
        config.same_site.as_str()
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &config.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

fn set_refresh_cookie(config: &CookieConfig, token: &str, expires_at: chrono::DateTime<Utc>) -> String {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    cookie_header(config, token, max_age)
}

fn clear_refresh_cookie(config: &CookieConfig) -> String {
    cookie_header(config, "", 0)
}

/// Refresh token from the cookie, falling back to a JSON body field.
fn presented_refresh_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    get_cookie(headers, REFRESH_COOKIE).or_else(|| {
        serde_json::from_slice::<RefreshTokenRequest>(body)
            .ok()
            .and_then(|b| b.refresh_token)
            .filter(|t| !t.is_empty())
    })
}

/// bcrypt bounds on a password chosen by a user or an admin.
pub(crate) fn check_password_length(password: &str, field: &str) -> Result<(), AuthError> {
    if (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password.len()) {
        Ok(())
    } else {
        Err(AuthError::BadRequest {
            message: format!("{field} must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"),
        })
    }
}

fn client_info(client: &ClientMeta) -> ClientInfo {
    ClientInfo {
        ip_address: Some(client.ip.clone()),
        user_agent: client.user_agent.clone(),
    }
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    // Emails match case-sensitively, as stored.
    let email = body.email.trim();
    if email.is_empty() || body.password.is_empty() {
        return Err(AuthError::BadRequest {
            message: "email and password are required".into(),
        });
    }

    let result = state
        .auth
        .login(email, &body.password, client_info(&client))
        .await;
    LOGINS_COUNTER.with_label_values(&[outcome_label(&result)]).inc();

    let (account, tokens) = match result {
        Ok(ok) => ok,
        Err(e) => {
            if matches!(
                e,
                AuthError::InvalidCredentials | AuthError::AccountLocked | AuthError::AccountInactive
            ) {
                let mut entry = AuditEntry::new("auth.login_failed")
                    .client(&client.ip, client.user_agent.as_deref());
                entry.user_email = Some(email.to_string());
                state.audit.record(entry);
            }
            return Err(e);
        }
    };

    state.audit.record(
        AuditEntry::new("auth.login")
            .user(account.id, &account.email)
            .client(&client.ip, client.user_agent.as_deref()),
    );

    let cookie = set_refresh_cookie(&state.config.cookie, &tokens.refresh_token, tokens.refresh_expires_at);
    let response = LoginResponse {
        access_token: tokens.access_token,
        expires_at: tokens.expires_at,
        token_type: tokens.token_type,
        user: UserProfile::from(&account),
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(response)).into_response())
}

/// POST /api/v1/auth/refresh
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(raw) = presented_refresh_token(&headers, &body) else {
        return AuthError::Unauthorized.into_response();
    };

    let result = state.auth.refresh_tokens(&raw).await;
    REFRESHES_COUNTER.with_label_values(&[outcome_label(&result)]).inc();

    match result {
        Ok(tokens) => {
            let cookie =
                set_refresh_cookie(&state.config.cookie, &tokens.refresh_token, tokens.refresh_expires_at);
            let response = RefreshResponse {
                access_token: tokens.access_token,
                expires_at: tokens.expires_at,
                token_type: tokens.token_type,
            };
            ([(header::SET_COOKIE, cookie)], Json(response)).into_response()
        }
        Err(e) if e.clears_refresh_cookie() => {
            let cookie = clear_refresh_cookie(&state.config.cookie);
            ([(header::SET_COOKIE, cookie)], e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/auth/logout
///
/// Always succeeds and always clears the cookie, even without a session.
pub async fn logout(
    State(state): State<AppState>,
    client: ClientMeta,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(raw) = presented_refresh_token(&headers, &body) {
        if let Err(e) = state.auth.logout(&raw).await {
            tracing::error!("logout error: {e}");
        }

        if let Ok(claims) = state.auth.codec().verify_refresh(&raw) {
            state.audit.record(
                AuditEntry::new("auth.logout")
                    .user(claims.user_id, &claims.email)
                    .client(&client.ip, client.user_agent.as_deref()),
            );
        }
    }

    let cookie = clear_refresh_cookie(&state.config.cookie);
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": "logged out successfully" })),
    )
        .into_response()
}

/// GET /api/v1/auth/me
pub async fn me(user: AuthenticatedUser) -> Json<serde_json::Value> {
    Json(json!({
        "id": user.user_id,
        "email": user.email,
        "role": user.role,
    }))
}

/// POST /api/v1/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    client: ClientMeta,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Response, AuthError> {
    check_password_length(&body.new_password, "new password")?;

    state
        .auth
        .change_password(user.user_id, &body.current_password, &body.new_password)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => AuthError::BadRequest {
                message: "current password is incorrect".into(),
            },
            other => other,
        })?;

    state.audit.record(
        AuditEntry::new("auth.password_changed")
            .user(user.user_id, &user.email)
            .resource("user", user.user_id)
            .client(&client.ip, client.user_agent.as_deref()),
    );

    // Every session was revoked, so the browser's cookie is dead too.
    let cookie = clear_refresh_cookie(&state.config.cookie);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": "password changed successfully, please log in again" })),
    )
        .into_response())
}
