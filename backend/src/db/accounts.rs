use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::user::{Account, AccountFilter};

/// Account lookup and the narrow set of mutations the auth core performs.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>>;
    /// One page of live accounts, newest first, with the total match count.
    async fn list(&self, filter: &AccountFilter) -> anyhow::Result<(Vec<Account>, i64)>;
    async fn create(&self, account: &Account) -> anyhow::Result<()>;
    /// Persists password hash, role, status and name.
    async fn update(&self, account: &Account) -> anyhow::Result<()>;
    async fn increment_failed_attempts(&self, id: Uuid) -> anyhow::Result<()>;
    /// Clears both the counter and any lock.
    async fn reset_failed_attempts(&self, id: Uuid) -> anyhow::Result<()>;
    async fn lock_account(&self, id: Uuid, until: DateTime<Utc>) -> anyhow::Result<()>;
    async fn update_last_login(&self, id: Uuid, ip: &str) -> anyhow::Result<()>;
    /// Returns false when no live account matched.
    async fn soft_delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

/// True when the store rejected a write because the email is already taken.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

/// Escape LIKE metacharacters and wrap the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// DB row struct (role and status are fetched as TEXT and parsed).
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: String,
    role: String,
    status: String,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(r: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            full_name: r.full_name,
            role: r.role.parse()?,
            status: r.status.parse()?,
            last_login_at: r.last_login_at,
            last_login_ip: r.last_login_ip,
            failed_attempts: r.failed_attempts,
            locked_until: r.locked_until,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, full_name, role, status,
    last_login_at, last_login_ip, failed_attempts, locked_until,
    created_at, updated_at, deleted_at";

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        // Soft-deleted rows are returned so the caller can report them as inactive.
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Account::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Account::try_from).transpose()
    }

    async fn list(&self, filter: &AccountFilter) -> anyhow::Result<(Vec<Account>, i64)> {
        const WHERE: &str = "WHERE deleted_at IS NULL
               AND ($1::text IS NULL OR role = $1)
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR email ILIKE $3 OR full_name ILIKE $3)";

        let role = filter.role.map(|r| r.to_string());
        let status = filter.status.map(|s| s.to_string());
        let search = filter.search.as_deref().map(like_pattern);

        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users {WHERE}
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(&role)
        .bind(&status)
        .bind(&search)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {WHERE}"))
            .bind(&role)
            .bind(&status)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let accounts = rows
            .into_iter()
            .map(Account::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((accounts, total))
    }

    async fn create(&self, account: &Account) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, full_name, role, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(account.role.to_string())
        .bind(account.status.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, account: &Account) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users
             SET password_hash = $1, full_name = $2, role = $3, status = $4, updated_at = NOW()
             WHERE id = $5 AND deleted_at IS NULL",
        )
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(account.role.to_string())
        .bind(account.status.to_string())
        .bind(account.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_failed_attempts(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET failed_attempts = failed_attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_failed_attempts(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET failed_attempts = 0, locked_until = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lock_account(&self, id: Uuid, until: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET locked_until = $1 WHERE id = $2")
            .bind(until)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid, ip: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW(), last_login_ip = NULLIF($1, '') WHERE id = $2")
            .bind(ip)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
