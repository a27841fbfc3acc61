use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    db::accounts::is_unique_violation,
    errors::AuthError,
    middleware::client::ClientMeta,
    models::{
        auth::AuthenticatedUser,
        user::{Account, CreateUserRequest, ListUsersQuery, UpdateUserRequest, UserRole},
    },
    routes::auth::check_password_length,
    services::audit::AuditEntry,
    AppState,
};

const FULL_NAME_LEN: std::ops::RangeInclusive<usize> = 2..=255;

async fn load_account(state: &AppState, id: Uuid) -> Result<Account, AuthError> {
    state
        .auth
        .account_store()
        .find_by_id(id)
        .await
        .context("find account by id")?
        .filter(|a| a.deleted_at.is_none())
        .ok_or(AuthError::NotFound { resource: "user" })
}

fn admin_entry(action: &str, admin: &AuthenticatedUser, target: Uuid, client: &ClientMeta) -> AuditEntry {
    AuditEntry::new(action)
        .user(admin.user_id, &admin.email)
        .resource("user", target)
        .client(&client.ip, client.user_agent.as_deref())
}

fn check_full_name(full_name: &str) -> Result<String, AuthError> {
    let full_name = full_name.trim();
    if FULL_NAME_LEN.contains(&full_name.chars().count()) {
        Ok(full_name.to_string())
    } else {
        Err(AuthError::BadRequest {
            message: format!(
                "full name must be between {} and {} characters",
                FULL_NAME_LEN.start(),
                FULL_NAME_LEN.end()
            ),
        })
    }
}

/// Admins manage accounts at or below their own role and never grant more.
fn check_can_manage(admin: &AuthenticatedUser, role: UserRole) -> Result<(), AuthError> {
    if admin.role.satisfies(role) {
        Ok(())
    } else {
        tracing::warn!(admin_id = %admin.user_id, admin_role = %admin.role, target_role = %role, "role above caller");
        Err(AuthError::Forbidden)
    }
}

/// GET /api/v1/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Value>, AuthError> {
    let (accounts, total) = state
        .auth
        .account_store()
        .list(&query.to_filter())
        .await
        .context("list accounts")?;

    let per_page = query.per_page();
    let total_pages = (total + per_page - 1) / per_page;
    Ok(Json(json!({
        "data": accounts,
        "page": query.page(),
        "per_page": per_page,
        "total": total,
        "total_pages": total_pages,
    })))
}

/// GET /api/v1/admin/users/{id}
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Account>, AuthError> {
    load_account(&state, id).await.map(Json)
}

/// POST /api/v1/admin/users
pub async fn create_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    client: ClientMeta,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Account>), AuthError> {
    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::BadRequest {
            message: "a valid email is required".into(),
        });
    }
    check_password_length(&body.password, "password")?;
    let full_name = check_full_name(&body.full_name)?;
    check_can_manage(&admin, body.role)?;

    let duplicate = || AuthError::Conflict {
        message: "a user with this email already exists".into(),
    };
    let store = state.auth.account_store();
    if store
        .find_by_email(email)
        .await
        .context("find account by email")?
        .is_some()
    {
        return Err(duplicate());
    }

    let password_hash = state.auth.hasher().hash(&body.password).await?;
    let account = Account::new(email, password_hash, &full_name, body.role);
    if let Err(e) = store.create(&account).await {
        // Lost a race with a concurrent create of the same email.
        if is_unique_violation(&e) {
            return Err(duplicate());
        }
        return Err(e.context("create account").into());
    }

    tracing::info!(admin_id = %admin.user_id, user_id = %account.id, role = %account.role, "account created");
    state.audit.record(admin_entry("user.created", &admin, account.id, &client));
    Ok((StatusCode::CREATED, Json(account)))
}

/// PUT /api/v1/admin/users/{id}: change name, role or status.
///
/// Role and status changes reach existing sessions at their next refresh;
/// a refresh on an account that is no longer active is refused.
pub async fn update_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    client: ClientMeta,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<Account>, AuthError> {
    if id == admin.user_id && (body.role.is_some() || body.status.is_some()) {
        return Err(AuthError::BadRequest {
            message: "cannot change your own role or status".into(),
        });
    }

    let mut account = load_account(&state, id).await?;
    check_can_manage(&admin, account.role)?;

    if let Some(full_name) = &body.full_name {
        account.full_name = check_full_name(full_name)?;
    }
    if let Some(role) = body.role {
        check_can_manage(&admin, role)?;
        account.role = role;
    }
    if let Some(status) = body.status {
        account.status = status;
    }

    state
        .auth
        .account_store()
        .update(&account)
        .await
        .context("update account")?;

    tracing::info!(
        admin_id = %admin.user_id,
        user_id = %id,
        role = %account.role,
        status = %account.status,
        "account updated"
    );
    state.audit.record(admin_entry("user.updated", &admin, id, &client));
    Ok(Json(account))
}

/// POST /api/v1/admin/users/{id}/unlock: clear the failure counter and any lock.
pub async fn unlock_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    client: ClientMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AuthError> {
    let account = load_account(&state, id).await?;
    state
        .auth
        .account_store()
        .reset_failed_attempts(account.id)
        .await
        .context("reset failed attempts")?;

    tracing::info!(admin_id = %admin.user_id, user_id = %id, "account unlocked");
    state.audit.record(admin_entry("user.unlocked", &admin, id, &client));
    Ok(Json(json!({ "message": "account unlocked" })))
}

/// POST /api/v1/admin/users/{id}/revoke-sessions: sign the account out everywhere.
pub async fn revoke_sessions(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    client: ClientMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AuthError> {
    let account = load_account(&state, id).await?;
    let revoked = state
        .auth
        .refresh_token_store()
        .revoke_all_for_account(account.id)
        .await
        .context("revoke refresh tokens")?;

    tracing::info!(admin_id = %admin.user_id, user_id = %id, revoked, "sessions revoked");
    state.audit.record(admin_entry("user.sessions_revoked", &admin, id, &client));
    Ok(Json(json!({ "revoked": revoked })))
}

/// DELETE /api/v1/admin/users/{id}: soft-delete and revoke all sessions.
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    client: ClientMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AuthError> {
    if id == admin.user_id {
        return Err(AuthError::BadRequest {
            message: "cannot delete your own account".into(),
        });
    }

    let deleted = state
        .auth
        .account_store()
        .soft_delete(id)
        .await
        .context("soft delete account")?;
    if !deleted {
        return Err(AuthError::NotFound { resource: "user" });
    }

    if let Err(e) = state.auth.refresh_token_store().revoke_all_for_account(id).await {
        tracing::error!("failed to revoke sessions of deleted account: {e:#}");
    }

    tracing::info!(admin_id = %admin.user_id, user_id = %id, "account deleted");
    state.audit.record(admin_entry("user.deleted", &admin, id, &client));
    Ok(Json(json!({ "message": "user deleted" })))
}
