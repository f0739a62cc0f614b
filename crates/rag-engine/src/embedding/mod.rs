//! Embedder (§4.4): maps a batch of strings to unit-norm dense vectors of
//! fixed dimension, via a pluggable backend.

pub mod hashing;
pub mod remote;

use async_trait::async_trait;

use crate::error::EngineError;

pub use hashing::HashingEmbedder;
pub use remote::RemoteEmbedder;

/// Uniform embedding contract. A single index is tied to one embedder
/// backend and one dimension (§4.4); callers are responsible for not
/// mixing them.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Backend identity persisted in the Vector Index's sidecar metadata
    /// (§4.5), so loaders can detect a mismatched backend.
    fn backend_name(&self) -> &'static str;

    /// Empty input yields an empty matrix. Every returned row is
    /// L2-normalized to unit length.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}
