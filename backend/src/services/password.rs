//! Password hashing and verification.

use anyhow::Context;

/// bcrypt wrapper. Hashing runs on the blocking pool so a slow cost factor
/// never stalls the async workers.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .context("password hashing task failed")?
            .context("hash password")
    }

    /// A malformed stored digest verifies as `false` rather than erroring.
    pub async fn verify(&self, plaintext: &str, digest: &str) -> anyhow::Result<bool> {
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &digest))
            .await
            .context("password verification task failed")?;

        Ok(verified.unwrap_or_else(|e| {
            tracing::warn!("stored password hash could not be parsed: {e}");
            false
        }))
    }
}
