use sqlx::PgPool;
use uuid::Uuid;

use crate::models::user::RefreshTokenRecord;

/// Persistence for refresh-token records, keyed by token fingerprint.
#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, record: &RefreshTokenRecord) -> anyhow::Result<()>;
    async fn find_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<Option<RefreshTokenRecord>>;
    /// Unknown fingerprints are not an error.
    async fn revoke_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<()>;
    async fn revoke_all_for_account(&self, user_id: Uuid) -> anyhow::Result<u64>;
    async fn delete_expired(&self) -> anyhow::Result<u64>;
}

pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, record: &RefreshTokenRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, ip_address, user_agent)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token_hash, expires_at, is_revoked, ip_address, user_agent,
                    created_at, revoked_at
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn revoke_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = NOW()
             WHERE token_hash = $1 AND is_revoked = FALSE",
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all_for_account(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = NOW()
             WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
