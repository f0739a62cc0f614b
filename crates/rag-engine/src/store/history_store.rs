//! History Store (§4.10): durable chats, messages, and summaries. Same
//! sqlx/sqlite shape as `chunk_store.rs`; kept as a separate store (and a
//! separate database file) because the two stores are rebuilt on
//! independent schedules — the Chunk Store on every ingest pass, the
//! History Store on every turn.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub chat_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub msg_id: i64,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub chat_id: String,
    pub summary: String,
    pub token_count: i64,
    pub last_turn_id: i64,
    pub timestamp: DateTime<Utc>,
}

pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn connect(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chats (
                chat_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                msg_id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL REFERENCES chats(chat_id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat_msg ON messages(chat_id, msg_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_summaries (
                chat_id TEXT PRIMARY KEY REFERENCES chats(chat_id) ON DELETE CASCADE,
                summary TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                last_turn_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// `title` should already be derived (first 80 trimmed chars of the
    /// first user message, per the chat-title convention this store's
    /// caller follows) — this method just persists whatever it is given.
    pub async fn create_chat(&self, title: &str) -> Result<String, EngineError> {
        let chat_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO chats (chat_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(&chat_id)
        .bind(title)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(chat_id)
    }

    pub async fn list_chats(&self, limit: i64) -> Result<Vec<ChatRecord>, EngineError> {
        let rows = sqlx::query(
            "SELECT chat_id, title, created_at, updated_at FROM chats ORDER BY updated_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_chat).collect()
    }

    pub async fn get_messages(&self, chat_id: &str, limit: i64) -> Result<Vec<MessageRecord>, EngineError> {
        let rows = sqlx::query(
            r#"SELECT msg_id, chat_id, role, content, created_at FROM messages
               WHERE chat_id = ?1 ORDER BY msg_id ASC LIMIT ?2"#,
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM chats WHERE chat_id = ?1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_message(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
    ) -> Result<i64, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO messages (chat_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ?1 WHERE chat_id = ?2")
            .bind(now.to_rfc3339())
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn save_summary(&self, summary: &SummaryRecord) -> Result<(), EngineError> {
        sqlx::query(
            r#"INSERT INTO chat_summaries (chat_id, summary, token_count, last_turn_id, timestamp)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(chat_id) DO UPDATE SET
                   summary = excluded.summary,
                   token_count = excluded.token_count,
                   last_turn_id = excluded.last_turn_id,
                   timestamp = excluded.timestamp"#,
        )
        .bind(&summary.chat_id)
        .bind(&summary.summary)
        .bind(summary.token_count)
        .bind(summary.last_turn_id)
        .bind(summary.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_summary(&self, chat_id: &str) -> Result<Option<SummaryRecord>, EngineError> {
        let row = sqlx::query(
            "SELECT chat_id, summary, token_count, last_turn_id, timestamp FROM chat_summaries WHERE chat_id = ?1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(SummaryRecord {
                chat_id: r.get("chat_id"),
                summary: r.get("summary"),
                token_count: r.get("token_count"),
                last_turn_id: r.get("last_turn_id"),
                timestamp: Self::parse_ts(r.get("timestamp"))?,
            })
        })
        .transpose()
    }

    fn parse_ts(raw: String) -> Result<DateTime<Utc>, EngineError> {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EngineError::StorageCorrupt(format!("invalid timestamp: {e}")))
    }

    fn row_to_chat(r: sqlx::sqlite::SqliteRow) -> Result<ChatRecord, EngineError> {
        Ok(ChatRecord {
            chat_id: r.get("chat_id"),
            title: r.get("title"),
            created_at: Self::parse_ts(r.get("created_at"))?,
            updated_at: Self::parse_ts(r.get("updated_at"))?,
        })
    }

    fn row_to_message(r: sqlx::sqlite::SqliteRow) -> Result<MessageRecord, EngineError> {
        Ok(MessageRecord {
            msg_id: r.get("msg_id"),
            chat_id: r.get("chat_id"),
            role: r.get("role"),
            content: r.get("content"),
            created_at: Self::parse_ts(r.get("created_at"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> HistoryStore {
        let dir = tempfile::tempdir().unwrap();
        HistoryStore::connect(&dir.path().join("history.sqlite")).await.unwrap()
    }

    #[tokio::test]
    async fn create_chat_then_list_chats_round_trips() {
        let s = store().await;
        let id = s.create_chat("hello world").await.unwrap();
        let chats = s.list_chats(10).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].chat_id, id);
        assert_eq!(chats[0].title, "hello world");
    }

    #[tokio::test]
    async fn add_message_bumps_chat_updated_at_ordering() {
        let s = store().await;
        let old = s.create_chat("older").await.unwrap();
        let newer = s.create_chat("newer").await.unwrap();

        // touch `old` so it becomes the most recently updated
        s.add_message(&old, "user", "hi").await.unwrap();

        let chats = s.list_chats(10).await.unwrap();
        assert_eq!(chats[0].chat_id, old);
        assert_eq!(chats[1].chat_id, newer);
    }

    #[tokio::test]
    async fn get_messages_orders_by_msg_id_ascending() {
        let s = store().await;
        let chat_id = s.create_chat("t").await.unwrap();
        s.add_message(&chat_id, "user", "first").await.unwrap();
        s.add_message(&chat_id, "assistant", "second").await.unwrap();

        let msgs = s.get_messages(&chat_id, 10).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "first");
        assert_eq!(msgs[1].content, "second");
        assert!(msgs[0].msg_id < msgs[1].msg_id);
    }

    #[tokio::test]
    async fn delete_chat_cascades_to_messages() {
        let s = store().await;
        let chat_id = s.create_chat("t").await.unwrap();
        s.add_message(&chat_id, "user", "hi").await.unwrap();

        s.delete_chat(&chat_id).await.unwrap();

        assert!(s.list_chats(10).await.unwrap().is_empty());
        assert!(s.get_messages(&chat_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_summary_is_upsert_on_chat_id() {
        let s = store().await;
        let chat_id = s.create_chat("t").await.unwrap();

        let first = SummaryRecord {
            chat_id: chat_id.clone(),
            summary: "v1".to_string(),
            token_count: 10,
            last_turn_id: 1,
            timestamp: Utc::now(),
        };
        s.save_summary(&first).await.unwrap();

        let second = SummaryRecord {
            summary: "v2".to_string(),
            token_count: 20,
            last_turn_id: 2,
            ..first
        };
        s.save_summary(&second).await.unwrap();

        let found = s.get_summary(&chat_id).await.unwrap().unwrap();
        assert_eq!(found.summary, "v2");
        assert_eq!(found.token_count, 20);
    }

    #[tokio::test]
    async fn get_summary_returns_none_when_absent() {
        let s = store().await;
        assert!(s.get_summary("nonexistent").await.unwrap().is_none());
    }
}
