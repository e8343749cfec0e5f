use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::api_key::ApiKey;
use crate::domain::error::{AppError, Result};

const KEY_PREFIX: &str = "ss";

/// Repository for API keys. Keys are stored as prefix + salted SHA-256 of the
/// secret; the full key exists only in the issuance response.
#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    pool: SqlitePool,
    salt: String,
}

impl ApiKeyRepository {
    pub fn new(pool: SqlitePool, salt: String) -> Self {
        Self { pool, salt }
    }

    /// Issue a new key. Returns the record and the full key string
    /// (`ss_{prefix}_{secret}`), which is never stored.
    pub async fn generate(&self, name: &str) -> Result<(ApiKey, String)> {
        let id = Uuid::new_v4().to_string();
        let prefix = Uuid::new_v4().simple().to_string()[..8].to_string();
        let secret = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let full_key = format!("{}_{}_{}", KEY_PREFIX, prefix, secret);
        let hashed = self.hash_secret(&secret);

        let entity = sqlx::query_as::<_, ApiKeyEntity>(
            "INSERT INTO api_keys (id, prefix, hashed_key, name) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(&id)
        .bind(&prefix)
        .bind(&hashed)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create API key: {}", e)))?;

        Ok((entity.into(), full_key))
    }

    /// Validate a presented token and return the owning principal.
    /// Refreshes `last_used` on success.
    pub async fn validate(&self, full_key: &str) -> Result<ApiKey> {
        let invalid = || AppError::Unauthorized("Invalid API key".to_string());

        let mut parts = full_key.splitn(3, '_');
        let (prefix, secret) = match (parts.next(), parts.next(), parts.next()) {
            (Some(KEY_PREFIX), Some(p), Some(s)) if !p.is_empty() && !s.is_empty() => (p, s),
            _ => return Err(invalid()),
        };

        let entity = sqlx::query_as::<_, ApiKeyEntity>(
            "SELECT * FROM api_keys WHERE prefix = ? AND is_active = 1",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up API key: {}", e)))?
        .ok_or_else(invalid)?;

        if self.hash_secret(secret) != entity.hashed_key {
            return Err(invalid());
        }

        sqlx::query("UPDATE api_keys SET last_used = datetime('now') WHERE id = ?")
            .bind(&entity.id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to touch API key: {}", e)))?;

        Ok(entity.into())
    }

    fn hash_secret(&self, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyEntity {
    id: String,
    prefix: String,
    hashed_key: String,
    name: String,
    is_active: i64,
    created_at: DateTime<Utc>,
    last_used: Option<DateTime<Utc>>,
}

impl From<ApiKeyEntity> for ApiKey {
    fn from(e: ApiKeyEntity) -> Self {
        Self {
            id: e.id,
            prefix: e.prefix,
            name: e.name,
            is_active: e.is_active != 0,
            created_at: e.created_at,
            last_used: e.last_used,
        }
    }
}
