//! HTTP handler layer: thin axum glue between `AppState` and the
//! `ChatOrchestrator`/`HistoryStore`. Handlers never touch the pipeline or
//! the stores directly — everything routes through state.

pub mod chat;
pub mod chats;
