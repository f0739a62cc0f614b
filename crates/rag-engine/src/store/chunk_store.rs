//! Chunk Store (§4.6): the corpus-side persistence layer — which documents
//! have been ingested and the chunks derived from them. Grounded on the
//! teacher's `database/repository.rs` for the sqlx usage pattern
//! (`query_as`, explicit transactions via `pool.begin()`), swapped from
//! postgres to sqlite since this engine runs entirely on-device.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct DocRecord {
    pub doc_id: String,
    pub path: String,
    pub mtime: i64,
    pub sha1: String,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub doc_id: String,
    pub path: String,
    pub idx: i64,
    pub start: i64,
    pub end: i64,
    pub text: String,
}

impl ChunkRecord {
    /// `chunk_id` is derived, never stored independently of `(doc_id, idx)`.
    pub fn make_id(doc_id: &str, idx: i64) -> String {
        format!("{doc_id}:{idx:06}")
    }
}

pub struct ChunkStore {
    pool: SqlitePool,
}

impl ChunkStore {
    pub async fn connect(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS docs (
                doc_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                sha1 TEXT NOT NULL,
                mime TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL REFERENCES docs(doc_id),
                path TEXT NOT NULL,
                idx INTEGER NOT NULL,
                start INTEGER NOT NULL,
                end INTEGER NOT NULL,
                text TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_doc_by_path(&self, path: &str) -> Result<Option<DocRecord>, EngineError> {
        let row = sqlx::query("SELECT doc_id, path, mtime, sha1, mime FROM docs WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| DocRecord {
            doc_id: r.get("doc_id"),
            path: r.get("path"),
            mtime: r.get("mtime"),
            sha1: r.get("sha1"),
            mime: r.get("mime"),
        }))
    }

    pub async fn upsert_doc(&self, doc: &DocRecord) -> Result<(), EngineError> {
        sqlx::query(
            r#"INSERT INTO docs (doc_id, path, mtime, sha1, mime)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(doc_id) DO UPDATE SET
                   path = excluded.path,
                   mtime = excluded.mtime,
                   sha1 = excluded.sha1,
                   mime = excluded.mime"#,
        )
        .bind(&doc.doc_id)
        .bind(&doc.path)
        .bind(doc.mtime)
        .bind(&doc.sha1)
        .bind(&doc.mime)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_chunks_for_doc(&self, doc_id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM chunks WHERE doc_id = ?1")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), EngineError> {
        for chunk in chunks {
            sqlx::query(
                r#"INSERT INTO chunks (chunk_id, doc_id, path, idx, start, end, text)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                   ON CONFLICT(chunk_id) DO UPDATE SET
                       path = excluded.path,
                       idx = excluded.idx,
                       start = excluded.start,
                       end = excluded.end,
                       text = excluded.text"#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.doc_id)
            .bind(&chunk.path)
            .bind(chunk.idx)
            .bind(chunk.start)
            .bind(chunk.end)
            .bind(&chunk.text)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Atomic per-doc rebuild: upsert the doc row, drop its old chunks, and
    /// insert the new ones in a single transaction (§4.6).
    pub async fn rebuild_doc(
        &self,
        doc: &DocRecord,
        chunks: &[ChunkRecord],
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO docs (doc_id, path, mtime, sha1, mime)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(doc_id) DO UPDATE SET
                   path = excluded.path,
                   mtime = excluded.mtime,
                   sha1 = excluded.sha1,
                   mime = excluded.mime"#,
        )
        .bind(&doc.doc_id)
        .bind(&doc.path)
        .bind(doc.mtime)
        .bind(&doc.sha1)
        .bind(&doc.mime)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE doc_id = ?1")
            .bind(&doc.doc_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"INSERT INTO chunks (chunk_id, doc_id, path, idx, start, end, text)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.doc_id)
            .bind(&chunk.path)
            .bind(chunk.idx)
            .bind(chunk.start)
            .bind(chunk.end)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(doc_id = %doc.doc_id, chunk_count = chunks.len(), "rebuilt doc chunks");
        Ok(())
    }

    pub async fn get_all_chunks(&self) -> Result<Vec<ChunkRecord>, EngineError> {
        let rows = sqlx::query(
            "SELECT chunk_id, doc_id, path, idx, start, end, text FROM chunks ORDER BY chunk_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ChunkRecord {
                chunk_id: r.get("chunk_id"),
                doc_id: r.get("doc_id"),
                path: r.get("path"),
                idx: r.get("idx"),
                start: r.get("start"),
                end: r.get("end"),
                text: r.get("text"),
            })
            .collect())
    }

    /// Preserves the order of `ids`; ids with no matching row are silently
    /// omitted (§4.6).
    pub async fn get_chunk_text_by_ids(&self, ids: &[String]) -> Result<Vec<String>, EngineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(",");
        let sql = format!("SELECT chunk_id, text FROM chunks WHERE chunk_id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_id = std::collections::HashMap::with_capacity(rows.len());
        for row in rows {
            let chunk_id: String = row.get("chunk_id");
            let text: String = row.get("text");
            by_id.insert(chunk_id, text);
        }

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}
