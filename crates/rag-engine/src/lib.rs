//! On-device retrieval-augmented generation serving engine: scans a local
//! document corpus, keeps a vector index and chunk store in sync with it,
//! and serves a streaming chat protocol backed by retrieval-grounded
//! generation against a pluggable language-model backend.

pub mod budget;
pub mod chat;
pub mod config;
pub mod demux;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod index;
pub mod ingest;
pub mod lm;
pub mod retrieval;
pub mod state;
pub mod store;
pub mod token;
pub mod transport;
pub mod utils;

pub use config::Settings;
pub use error::{EngineError, Result};
pub use state::AppState;
