use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown email or wrong password. Never distinguishes the two.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is inactive")]
    AccountInactive,

    #[error("account is temporarily locked due to too many failed attempts")]
    AccountLocked,

    /// Malformed, expired, or wrongly-signed token, or a refresh token with no stored record.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Structurally valid refresh token whose stored record is revoked or expired.
    #[error("refresh token has been revoked")]
    TokenRevoked,

    #[error("authentication required")]
    Unauthorized,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("{message}")]
    Conflict { message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::AccountLocked
            | AuthError::InvalidToken
            | AuthError::TokenRevoked
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::AccountInactive | AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
            AuthError::Conflict { .. } => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to echo to the client. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the client should drop its refresh-token cookie.
    pub fn clears_refresh_cookie(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken | AuthError::TokenRevoked | AuthError::AccountInactive
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Internal(e) => tracing::error!("Internal error: {e:#}"),
            AuthError::Forbidden | AuthError::Unauthorized => {
                tracing::debug!("Authorization rejected: {self}")
            }
            _ => {}
        }

        let mut response =
            (self.status_code(), Json(json!({ "error": self.user_message() }))).into_response();
        if let AuthError::TooManyRequests { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from(retry_after_secs));
        }
        response
    }
}
