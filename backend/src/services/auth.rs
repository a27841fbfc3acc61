use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    db::{accounts::AccountStore, refresh_tokens::RefreshTokenStore},
    errors::AuthError,
    models::{
        auth::AuthTokens,
        user::{Account, RefreshTokenRecord},
    },
    services::{
        fingerprint::fingerprint, lockout::LockoutPolicy, password::PasswordHasher,
        tokens::TokenCodec,
    },
};

/// Client metadata stored alongside a refresh-token record.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        accounts: Arc<dyn AccountStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            accounts,
            refresh_tokens,
            codec: TokenCodec::new(config),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            lockout: LockoutPolicy::from_config(config),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn account_store(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub fn refresh_token_store(&self) -> &dyn RefreshTokenStore {
        self.refresh_tokens.as_ref()
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Authenticate by email and password and issue a fresh token pair.
    ///
    /// Order of checks: unknown email, then inactive, then locked, then
    /// password. Unknown email and wrong password produce the same error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<(Account, AuthTokens), AuthError> {
        let account = self
            .accounts
            .find_by_email(email)
            .await
            .context("find account by email")?
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.is_active() {
            tracing::warn!(email, status = %account.status, "login attempt on inactive account");
            return Err(AuthError::AccountInactive);
        }

        let now = Utc::now();
        if self.lockout.is_locked(&account, now) {
            tracing::warn!(email, locked_until = ?account.locked_until, "login attempt on locked account");
            return Err(AuthError::AccountLocked);
        }

        if !self.hasher.verify(password, &account.password_hash).await? {
            self.lockout.record_failure(self.accounts.as_ref(), &account, now).await;
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.record_success(self.accounts.as_ref(), &account).await;

        let ip = client.ip_address.clone().unwrap_or_default();
        if let Err(e) = self.accounts.update_last_login(account.id, &ip).await {
            tracing::error!("failed to update last login: {e:#}");
        }

        let tokens = self.generate_tokens(&account, client).await?;

        tracing::info!(user_id = %account.id, email = %account.email, %ip, "user logged in successfully");
        Ok((account, tokens))
    }

    /// Revoke the presented refresh token. Unknown tokens are not an error.
    pub async fn logout(&self, raw_refresh_token: &str) -> Result<(), AuthError> {
        self.refresh_tokens
            .revoke_by_fingerprint(&fingerprint(raw_refresh_token))
            .await
            .context("revoke refresh token")?;
        Ok(())
    }

    /// Exchange a valid refresh token for a new pair, revoking the presented one.
    pub async fn refresh_tokens(&self, raw_refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let claims = self.codec.verify_refresh(raw_refresh_token)?;

        let token_hash = fingerprint(raw_refresh_token);
        let stored = self
            .refresh_tokens
            .find_by_fingerprint(&token_hash)
            .await
            .context("find refresh token")?
            .ok_or(AuthError::InvalidToken)?;

        if stored.user_id != claims.user_id {
            tracing::warn!(user_id = %claims.user_id, "refresh token owner does not match its claims");
            return Err(AuthError::InvalidToken);
        }

        if !stored.is_valid_at(Utc::now()) {
            return Err(AuthError::TokenRevoked);
        }

        let account = self
            .accounts
            .find_by_id(stored.user_id)
            .await
            .context("find account by id")?
            .ok_or(AuthError::AccountInactive)?;

        if !account.is_active() {
            return Err(AuthError::AccountInactive);
        }

        // New record first, then revoke the old one. A failed revoke leaves a
        // short overlap rather than locking the user out.
        let tokens = self
            .generate_tokens(
                &account,
                ClientInfo {
                    ip_address: stored.ip_address.clone(),
                    user_agent: stored.user_agent.clone(),
                },
            )
            .await?;

        if let Err(e) = self.refresh_tokens.revoke_by_fingerprint(&token_hash).await {
            tracing::error!("failed to revoke old refresh token: {e:#}");
        }

        Ok(tokens)
    }

    /// Replace the password after checking the current one, then sign out
    /// every device.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .find_by_id(account_id)
            .await
            .context("find account by id")?
            .ok_or(AuthError::Unauthorized)?;

        if !self.hasher.verify(current_password, &account.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        account.password_hash = self.hasher.hash(new_password).await?;
        self.accounts
            .update(&account)
            .await
            .context("update password hash")?;

        if let Err(e) = self.refresh_tokens.revoke_all_for_account(account_id).await {
            tracing::error!("failed to revoke all refresh tokens after password change: {e:#}");
        }

        tracing::info!(user_id = %account_id, "password changed successfully");
        Ok(())
    }

    async fn generate_tokens(&self, account: &Account, client: ClientInfo) -> Result<AuthTokens, AuthError> {
        let (access_token, expires_at) = self.codec.issue_access(account)?;
        let (refresh_token, refresh_expires_at) = self.codec.issue_refresh(account)?;

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: account.id,
            token_hash: fingerprint(&refresh_token),
            expires_at: refresh_expires_at,
            is_revoked: false,
            ip_address: client.ip_address.filter(|s| !s.is_empty()),
            user_agent: client.user_agent.filter(|s| !s.is_empty()),
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.refresh_tokens
            .create(&record)
            .await
            .context("store refresh token")?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            expires_at,
            refresh_expires_at,
            token_type: "Bearer",
        })
    }
}
