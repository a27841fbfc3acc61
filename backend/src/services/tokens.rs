//! Access and refresh JWT issuance and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    errors::AuthError,
    models::{auth::Claims, user::Account},
};

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies the two token classes. Access and refresh tokens share
/// a claims shape but are signed with independent secrets, so a token of one
/// class never verifies as the other.
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    // None when the configured lifetime does not fit a chrono Duration.
    access_ttl: Option<Duration>,
    refresh_ttl: Option<Duration>,
    issuer: String,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            access: SigningKeys::from_secret(&config.access_secret),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            access_ttl: ttl_from_seconds(config.access_expiry_seconds),
            refresh_ttl: config.refresh_expiry_days.checked_mul(86_400).and_then(ttl_from_seconds),
            issuer: config.issuer.clone(),
            validation,
        }
    }

    pub fn issue_access(&self, account: &Account) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue(account, &self.access.encoding, self.access_ttl)
    }

    pub fn issue_refresh(&self, account: &Account) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue(account, &self.refresh.encoding, self.refresh_ttl)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, &self.access.decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, &self.refresh.decoding)
    }

    fn issue(
        &self,
        account: &Account,
        key: &EncodingKey,
        ttl: Option<Duration>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("token lifetime out of range")))?;
        let claims = Claims {
            user_id: account.id,
            email: account.email.clone(),
            role: account.role,
            iss: self.issuer.clone(),
            sub: account.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("sign JWT: {e}")))?;
        Ok((token, expires_at))
    }

    fn verify(&self, token: &str, key: &DecodingKey) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, key, &self.validation).map_err(|e| {
            tracing::debug!("token rejected: {e}");
            AuthError::InvalidToken
        })?;

        // sub is the account id; a mismatch means the claims were not minted here.
        if data.claims.sub != data.claims.user_id.to_string() {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

fn ttl_from_seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}
