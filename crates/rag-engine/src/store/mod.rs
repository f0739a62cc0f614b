//! Persistent stores (§4.6, §4.10). Both are sqlite-backed via `sqlx`,
//! single-writer per process, every write wrapped in a transaction.

pub mod chunk_store;
pub mod history_store;

pub use chunk_store::{ChunkRecord, ChunkStore, DocRecord};
pub use history_store::{ChatRecord, HistoryStore, MessageRecord};
