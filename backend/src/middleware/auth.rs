use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{errors::AuthError, models::auth::AuthenticatedUser, AppState};

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively and the header must split into
/// exactly two space-separated parts.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(AuthError::Unauthorized),
    }
}

/// Verifies the access token and attaches the caller's identity to the
/// request. Requests without a valid token never reach the handler.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers())?;
    let claims = state.auth.codec().verify_access(token)?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(claims));
    Ok(next.run(request).await)
}

/// Reads the identity placed by [`authenticate`]. A handler mounted without
/// that middleware rejects every request.
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}
