//! Retrieval pipeline (§4.7, §4.9): turns a query into ranked, prompt-ready
//! evidence snippets, and owns the scan/chunk/embed/index build pass that
//! keeps the Vector Index and Chunk Store in sync with the corpus.

pub mod pipeline;
pub mod reranker;

pub use pipeline::{RetrievalPipeline, Snippet};
pub use reranker::rerank;

/// A single vector-search hit carrying enough of the chunk to rerank and
/// format it, independent of the Chunk Store's own row type.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk_id: String,
    pub path: String,
    pub score: f32,
    pub text: String,
}
