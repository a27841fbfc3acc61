use axum::{extract::Request, middleware::Next, response::Response};

use crate::{
    errors::AuthError,
    models::{auth::AuthenticatedUser, user::UserRole},
};

/// Role gate. No identity is a 401, an identity below `required` is a 403.
pub fn authorize(user: Option<&AuthenticatedUser>, required: UserRole) -> Result<(), AuthError> {
    let user = user.ok_or(AuthError::Unauthorized)?;
    if user.role.satisfies(required) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.user_id, role = %user.role, %required, "role check failed");
        Err(AuthError::Forbidden)
    }
}

async fn require(required: UserRole, request: Request, next: Next) -> Result<Response, AuthError> {
    authorize(request.extensions().get::<AuthenticatedUser>(), required)?;
    Ok(next.run(request).await)
}

pub async fn require_editor(request: Request, next: Next) -> Result<Response, AuthError> {
    require(UserRole::Editor, request, next).await
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, AuthError> {
    require(UserRole::Admin, request, next).await
}

pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, AuthError> {
    require(UserRole::SuperAdmin, request, next).await
}
