use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// JWT claims shared by access and refresh tokens. The two classes differ only
/// in signing secret and lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub iss: String,
    pub sub: String, // account id
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity attached to a request by the authentication middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl From<Claims> for AuthenticatedUser {
    fn from(c: Claims) -> Self {
        Self {
            user_id: c.user_id,
            email: c.email,
            role: c.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token expiry.
    pub expires_at: DateTime<Utc>,
    /// Refresh-token expiry, used for the cookie lifetime.
    #[serde(skip_serializing)]
    pub refresh_expires_at: DateTime<Utc>,
    pub token_type: &'static str,
}
