use chrono::{DateTime, Duration, Utc};

use crate::{config::AuthConfig, db::accounts::AccountStore, models::user::Account};

/// Consecutive-failure lockout. A lock ends on its own once `locked_until`
/// passes; nothing needs to run in the background.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    threshold: u32,
    duration: Duration,
}

impl LockoutPolicy {
    pub fn new(threshold: u32, duration: Duration) -> Self {
        Self { threshold, duration }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let duration = i64::try_from(config.lockout_duration_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .unwrap_or(Duration::MAX);
        Self::new(config.lockout_threshold, duration)
    }

    pub fn is_locked(&self, account: &Account, now: DateTime<Utc>) -> bool {
        account.is_locked_at(now)
    }

    /// Lock deadline to apply after one more failure on top of `failed_before`,
    /// or `None` if the account stays unlocked.
    pub fn lock_deadline(&self, failed_before: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let attempts = i64::from(failed_before.max(0)) + 1;
        (attempts >= i64::from(self.threshold))
            .then(|| now.checked_add_signed(self.duration).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Failed password check. Bookkeeping errors are logged, never returned:
    /// the caller answers with the same credentials error either way.
    pub async fn record_failure(&self, accounts: &dyn AccountStore, account: &Account, now: DateTime<Utc>) {
        if let Err(e) = accounts.increment_failed_attempts(account.id).await {
            tracing::error!("failed to increment failed attempts: {e:#}");
        }

        if let Some(until) = self.lock_deadline(account.failed_attempts, now) {
            if let Err(e) = accounts.lock_account(account.id, until).await {
                tracing::error!("failed to lock account: {e:#}");
            }
            tracing::warn!(
                email = %account.email,
                attempts = account.failed_attempts + 1,
                "account locked due to too many failed attempts"
            );
        }
    }

    /// Successful password check always clears the counter and any lock.
    pub async fn record_success(&self, accounts: &dyn AccountStore, account: &Account) {
        if let Err(e) = accounts.reset_failed_attempts(account.id).await {
            tracing::error!("failed to reset failed attempts: {e:#}");
        }
    }
}
