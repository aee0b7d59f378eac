//! Users and their API keys.
//!
//! Keys are shown to the operator once at creation and stored only as a
//! lowercase hex SHA-256 digest. A presented key resolves to the owning user
//! id, which is the caller identity used for conversation ownership.

use chrono::Utc;
use parley_types::error::RepositoryError;
use sha2::{Digest, Sha256};
use sqlx::Row;
use uuid::Uuid;

use super::chat::format_datetime;
use super::pool::DatabasePool;

const KEY_PREFIX: &str = "prly_";

/// A freshly created user and the plaintext key issued to them.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub user_id: String,
    pub api_key: String,
}

/// SQLite-backed user and API key registry.
#[derive(Clone)]
pub struct SqliteApiKeyStore {
    pool: DatabasePool,
}

impl SqliteApiKeyStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a user named `name` and issue its first key.
    ///
    /// Both rows are written in one transaction, so a user never exists
    /// without a key.
    pub async fn create_user(&self, name: &str) -> Result<IssuedKey, RepositoryError> {
        let user_id = Uuid::now_v7().to_string();

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("INSERT INTO users (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&user_id)
            .bind(name)
            .bind(format_datetime(&Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    RepositoryError::Conflict(format!("user '{name}' already exists"))
                }
                _ => RepositoryError::Query(e.to_string()),
            })?;

        let api_key = insert_key(&mut *tx, &user_id, "default").await?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(IssuedKey { user_id, api_key })
    }

    /// Issue another key for an existing user. Returns the plaintext key.
    pub async fn issue_key(&self, user_id: &str, label: &str) -> Result<String, RepositoryError> {
        insert_key(&self.pool.writer, user_id, label).await
    }

    /// Resolve a presented key to its owner's user id.
    pub async fn resolve_caller(&self, api_key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT id, user_id FROM api_keys WHERE key_hash = ?")
            .bind(hash_api_key(api_key))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let key_id: String = row
            .try_get("id")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Best effort; a failed bookkeeping write must not reject the caller.
        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(&key_id)
            .execute(&self.pool.writer)
            .await
        {
            tracing::debug!(key_id = %key_id, error = %e, "Failed to record API key use");
        }

        Ok(Some(user_id))
    }
}

/// Generate a key for `user_id`, store its hash and return the plaintext.
async fn insert_key<'e, E>(executor: E, user_id: &str, label: &str) -> Result<String, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let api_key = generate_api_key();

    sqlx::query(
        "INSERT INTO api_keys (id, user_id, key_hash, name, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_id)
    .bind(hash_api_key(&api_key))
    .bind(label)
    .bind(format_datetime(&Utc::now()))
    .execute(executor)
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => RepositoryError::Query(e.to_string()),
    })?;

    Ok(api_key)
}

/// Compute SHA-256 hash of an API key (lowercase hex).
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}

/// 256 bits of randomness from two v4 UUIDs, hex encoded behind a prefix.
fn generate_api_key() -> String {
    format!(
        "{KEY_PREFIX}{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}
