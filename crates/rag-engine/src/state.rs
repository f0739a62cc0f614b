//! Application state shared across handlers. A single process owns one
//! instance of each store, one retrieval pipeline, and one chat
//! orchestrator — nothing downstream constructs its own.

use std::sync::Arc;

use crate::chat::ChatOrchestrator;
use crate::config::Settings;
use crate::store::history_store::HistoryStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub history: Arc<HistoryStore>,
    pub orchestrator: Arc<ChatOrchestrator>,
}
