//! Chat Orchestrator (§4.13): the query-time state machine binding
//! retrieval -> prompt build -> LM stream -> demux -> event emission ->
//! persistence.

pub mod events;
pub mod orchestrator;

pub use events::{ChatEvent, RagDoc};
pub use orchestrator::{ChatOrchestrator, ChatRequest};
