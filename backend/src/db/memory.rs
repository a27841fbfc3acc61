//! In-memory stores for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{accounts::AccountStore, audit_log::AuditStore, refresh_tokens::RefreshTokenStore},
    models::user::{Account, AccountFilter, RefreshTokenRecord},
    services::audit::AuditEntry,
};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    pub fail_last_login: AtomicBool,
}

impl MemoryAccountStore {
    pub fn insert(&self, account: Account) {
        self.accounts.lock().unwrap().insert(account.id, account);
    }

    pub fn get(&self, id: Uuid) -> Account {
        self.accounts.lock().unwrap()[&id].clone()
    }

    fn with_account(&self, id: Uuid, f: impl FnOnce(&mut Account)) {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(&id) {
            f(account);
        }
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, filter: &AccountFilter) -> anyhow::Result<(Vec<Account>, i64)> {
        let mut matched: Vec<Account> = self
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit).unwrap_or(0))
            .collect();
        Ok((page, total))
    }

    async fn create(&self, account: &Account) -> anyhow::Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.values().any(|a| a.email == account.email) {
            anyhow::bail!("duplicate email: {}", account.email);
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> anyhow::Result<()> {
        self.with_account(account.id, |a| {
            a.password_hash = account.password_hash.clone();
            a.full_name = account.full_name.clone();
            a.role = account.role;
            a.status = account.status;
            a.updated_at = Utc::now();
        });
        Ok(())
    }

    async fn increment_failed_attempts(&self, id: Uuid) -> anyhow::Result<()> {
        self.with_account(id, |a| a.failed_attempts += 1);
        Ok(())
    }

    async fn reset_failed_attempts(&self, id: Uuid) -> anyhow::Result<()> {
        self.with_account(id, |a| {
            a.failed_attempts = 0;
            a.locked_until = None;
        });
        Ok(())
    }

    async fn lock_account(&self, id: Uuid, until: DateTime<Utc>) -> anyhow::Result<()> {
        self.with_account(id, |a| a.locked_until = Some(until));
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid, ip: &str) -> anyhow::Result<()> {
        if self.fail_last_login.load(Ordering::SeqCst) {
            anyhow::bail!("last-login write unavailable");
        }
        self.with_account(id, |a| {
            a.last_login_at = Some(Utc::now());
            a.last_login_ip = Some(ip.to_string());
        });
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut deleted = false;
        self.with_account(id, |a| {
            if a.deleted_at.is_none() {
                a.deleted_at = Some(Utc::now());
                deleted = true;
            }
        });
        Ok(deleted)
    }
}

#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
    pub fail_revocations: AtomicBool,
}

impl MemoryRefreshTokenStore {
    pub fn records_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn create(&self, record: &RefreshTokenRecord) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<Option<RefreshTokenRecord>> {
        Ok(self.records.lock().unwrap().get(fingerprint).cloned())
    }

    async fn revoke_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<()> {
        if self.fail_revocations.load(Ordering::SeqCst) {
            anyhow::bail!("revocation write unavailable");
        }
        if let Some(record) = self.records.lock().unwrap().get_mut(fingerprint) {
            record.is_revoked = true;
            record.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_all_for_account(&self, user_id: Uuid) -> anyhow::Result<u64> {
        if self.fail_revocations.load(Ordering::SeqCst) {
            anyhow::bail!("revocation write unavailable");
        }
        let mut count = 0;
        for record in self.records.lock().unwrap().values_mut() {
            if record.user_id == user_id && !record.is_revoked {
                record.is_revoked = true;
                record.revoked_at = Some(Utc::now());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryAuditStore {
    pub entries: Mutex<Vec<AuditEntry>>,
}

#[async_trait::async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
