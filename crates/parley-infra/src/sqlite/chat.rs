//! SQLite turn store implementation.
//!
//! Implements `TurnStore` from `parley-core` using sqlx with split read/write
//! pools: raw queries, private Row structs, reads on the reader pool and
//! writes on the single writer connection.

use chrono::{DateTime, SecondsFormat, Utc};
use parley_core::chat::repository::TurnStore;
use parley_types::chat::{ChatMessage, Conversation, DEFAULT_CONVERSATION_TITLE, NewMessage};
use parley_types::error::RepositoryError;
use parley_types::llm::MessageRole;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `TurnStore`.
pub struct SqliteTurnStore {
    pool: DatabasePool,
}

impl SqliteTurnStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ConversationRow {
    id: String,
    owner_id: String,
    title: String,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?;

        Ok(Conversation {
            id,
            owner_id: self.owner_id,
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    reasoning: Option<String>,
    model: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            reasoning: row.try_get("reasoning")?,
            model: row.try_get("model")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let conversation_id = Uuid::parse_str(&self.conversation_id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ChatMessage {
            id,
            conversation_id,
            role,
            content: self.content,
            reasoning: self.reasoning,
            model: self.model,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so that text order matches time order.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// TurnStore implementation
// ---------------------------------------------------------------------------

impl TurnStore for SqliteTurnStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<Conversation, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations (id, owner_id, title, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.owner_id)
        .bind(&conversation.title)
        .bind(format_datetime(&conversation.created_at))
        .bind(format_datetime(&conversation.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("conversation {} already exists", conversation.id))
            }
            _ => query_error(e),
        })?;

        Ok(conversation.clone())
    }

    async fn get_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let conversation_row = ConversationRow::from_row(&row).map_err(query_error)?;
                Ok(Some(conversation_row.into_conversation()?))
            }
            None => Ok(None),
        }
    }

    async fn list_conversations(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE owner_id = ? ORDER BY updated_at DESC, rowid DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation_row = ConversationRow::from_row(row).map_err(query_error)?;
            conversations.push(conversation_row.into_conversation()?);
        }

        Ok(conversations)
    }

    async fn append_message(
        &self,
        conversation_id: &Uuid,
        message: NewMessage,
    ) -> Result<ChatMessage, RepositoryError> {
        insert_message(&self.pool.writer, conversation_id, message).await
    }

    async fn append_and_touch(
        &self,
        conversation_id: &Uuid,
        message: NewMessage,
        title_if_unset: Option<&str>,
    ) -> Result<ChatMessage, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let stored = insert_message(&mut *tx, conversation_id, message).await?;
        touch(&mut *tx, conversation_id, title_if_unset).await?;

        tx.commit().await.map_err(query_error)?;
        Ok(stored)
    }

    async fn list_messages(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE conversation_id = ? ORDER BY rowid ASC")
            .bind(conversation_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row = MessageRow::from_row(row).map_err(query_error)?;
            messages.push(message_row.into_message()?);
        }

        Ok(messages)
    }

    async fn touch_conversation(
        &self,
        conversation_id: &Uuid,
        title_if_unset: Option<&str>,
    ) -> Result<(), RepositoryError> {
        touch(&self.pool.writer, conversation_id, title_if_unset).await
    }
}

async fn insert_message<'e, E>(
    executor: E,
    conversation_id: &Uuid,
    message: NewMessage,
) -> Result<ChatMessage, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let stored = ChatMessage {
        id: Uuid::now_v7(),
        conversation_id: *conversation_id,
        role: message.role,
        content: message.content,
        reasoning: message.reasoning,
        model: message.model,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"INSERT INTO messages (id, conversation_id, role, content, reasoning, model, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(stored.id.to_string())
    .bind(stored.conversation_id.to_string())
    .bind(stored.role.to_string())
    .bind(&stored.content)
    .bind(&stored.reasoning)
    .bind(&stored.model)
    .bind(format_datetime(&stored.created_at))
    .execute(executor)
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => query_error(e),
    })?;

    Ok(stored)
}

/// Advance `updated_at`; set the title only while it is still the default.
async fn touch<'e, E>(
    executor: E,
    conversation_id: &Uuid,
    title_if_unset: Option<&str>,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"UPDATE conversations
           SET updated_at = ?,
               title = CASE WHEN ? IS NOT NULL AND title = ? THEN ? ELSE title END
           WHERE id = ?"#,
    )
    .bind(format_datetime(&Utc::now()))
    .bind(title_if_unset)
    .bind(DEFAULT_CONVERSATION_TITLE)
    .bind(title_if_unset)
    .bind(conversation_id.to_string())
    .execute(executor)
    .await
    .map_err(query_error)?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}
