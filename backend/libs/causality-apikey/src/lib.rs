//! API-key issuance, revocation, and lookup.
//!
//! Keys are 256 bits of randomness encoded as 64 lowercase hex characters.
//! Only the SHA-256 hash is ever persisted; the plaintext is returned once,
//! at creation. A single round of SHA-256 (not a password hash like
//! bcrypt/argon2) is deliberate here: the input space is already uniform
//! 256-bit randomness, so there is nothing for a slow hash to protect
//! against, and a request-path lookup needs to stay cheap.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("api key not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ApiKeyError>;

/// An issued key record. The hash is intentionally not a field here: it
/// never needs to leave the store after lookup.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: Uuid,
    pub app_id: String,
    pub name: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Returned once, at creation time, and never again.
pub struct NewApiKey {
    pub id: Uuid,
    pub app_id: String,
    pub name: String,
    pub plaintext: String,
}

/// 64 lowercase hex characters, nothing else. Rejecting ill-formed input
/// before hashing avoids a wasted hash + lookup for obviously-bogus
/// credentials.
pub fn is_well_formed_key(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

pub fn hash_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_plaintext() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct ApiKeyStore {
    pool: PgPool,
}

impl ApiKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_key(&self, app_id: &str, name: &str) -> Result<NewApiKey> {
        let plaintext = generate_plaintext();
        let hash = hash_key(&plaintext);
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, app_id, key_hash, name, revoked, created_at)
            VALUES ($1, $2, $3, $4, false, now())
            "#,
        )
        .bind(id)
        .bind(app_id)
        .bind(&hash)
        .bind(name)
        .execute(&self.pool)
        .await?;

        tracing::info!(app_id, key_id = %id, "api key created");

        Ok(NewApiKey {
            id,
            app_id: app_id.to_owned(),
            name: name.to_owned(),
            plaintext,
        })
    }

    /// Idempotent: revoking an already-revoked key succeeds silently.
    /// A missing id is the caller's 404 to report.
    pub async fn revoke(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET revoked = true, revoked_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }
        Ok(())
    }

    /// Newest first. Hashes never leave the store.
    pub async fn list(&self, app_id: &str) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, app_id, name, revoked, created_at, revoked_at
            FROM api_keys
            WHERE app_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ApiKey::from).collect())
    }

    /// `None` covers both "no such hash" and "hash belongs to a revoked
    /// key" — callers must not distinguish the two; an authentication
    /// miss is always a plain 401.
    pub async fn validate_by_hash(&self, hash: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, app_id, name, revoked, created_at, revoked_at
            FROM api_keys
            WHERE key_hash = $1 AND revoked = false
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ApiKey::from))
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    app_id: String,
    name: String,
    revoked: bool,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id,
            app_id: row.app_id,
            name: row.name,
            revoked: row.revoked,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_key_is_64_lowercase_hex() {
        let key = generate_plaintext();
        assert!(is_well_formed_key(&key));
    }

    #[test]
    fn rejects_uppercase_and_wrong_length() {
        assert!(!is_well_formed_key("ABCD"));
        assert!(!is_well_formed_key(&"a".repeat(63)));
        assert!(!is_well_formed_key(&"A".repeat(64)));
        assert!(!is_well_formed_key(&"g".repeat(64))); // not a hex digit
    }

    #[test]
    fn hash_is_deterministic_and_64_hex_chars() {
        let plaintext = generate_plaintext();
        let h1 = hash_key(&plaintext);
        let h2 = hash_key(&plaintext);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn distinct_plaintexts_hash_differently() {
        let a = hash_key(&generate_plaintext());
        let b = hash_key(&generate_plaintext());
        assert_ne!(a, b);
    }
}
