//! Retrieval Pipeline (§4.9): owns the build-or-update-index pass and the
//! query-time retrieve/format path. Wires together the Filesystem Scanner,
//! parser, chunker, embedder, Vector Index, and Chunk Store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::index::{self, VectorIndex};
use crate::ingest::{chunk_text, parse_file, scan, IngestItem, SymlinkPolicy};
use crate::retrieval::{rerank, Candidate};
use crate::store::chunk_store::{ChunkRecord, ChunkStore, DocRecord};

pub struct Snippet {
    pub path: String,
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
}

pub struct RetrievalPipeline {
    globs: Vec<String>,
    exts: Vec<String>,
    max_file_size: u64,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    candidates_k: usize,
    rerank_alpha: f32,
    index_prefix: PathBuf,
    embedder: Box<dyn Embedder>,
    chunk_store: ChunkStore,
    index: Mutex<Box<dyn VectorIndex>>,
    prefer_ann: bool,
}

impl RetrievalPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        globs: Vec<String>,
        exts: Vec<String>,
        max_file_size: u64,
        chunk_size: usize,
        chunk_overlap: usize,
        top_k: usize,
        candidates_k: usize,
        rerank_alpha: f32,
        index_prefix: PathBuf,
        embedder: Box<dyn Embedder>,
        chunk_store: ChunkStore,
        prefer_ann: bool,
    ) -> Self {
        let dim = embedder.dimensions();
        Self {
            globs,
            exts,
            max_file_size,
            chunk_size,
            chunk_overlap,
            top_k,
            candidates_k,
            rerank_alpha,
            index_prefix,
            embedder,
            chunk_store,
            index: Mutex::new(index::build_index(dim, prefer_ann)),
            prefer_ann,
        }
    }

    /// Scans, diffs, and re-embeds as needed (§4.9). Idempotent: a second
    /// call against an unchanged corpus is a no-op beyond the scan itself.
    pub async fn build_or_update_index(&self) -> Result<(), EngineError> {
        let items = scan(&self.globs, &self.exts, self.max_file_size, SymlinkPolicy::Skip);

        let mut any_doc_changed = false;

        for item in &items {
            any_doc_changed |= self.sync_doc(item).await?;
        }

        let dim = self.embedder.dimensions();
        let needs_rebuild = any_doc_changed || !index::exists(&self.index_prefix);

        if needs_rebuild {
            let all_chunks = self.chunk_store.get_all_chunks().await?;
            info!(chunk_count = all_chunks.len(), "rebuilding vector index");

            let texts: Vec<String> = all_chunks.iter().map(|c| c.text.clone()).collect();
            let ids: Vec<String> = all_chunks.iter().map(|c| c.chunk_id.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            let mut idx = index::build_index(dim, self.prefer_ann);
            idx.build(vectors, ids)?;
            idx.save(&self.index_prefix)?;
            *self.index.lock().expect("index lock poisoned") = idx;
        }

        Ok(())
    }

    /// Returns `true` when `item`'s stored doc record needed a chunk
    /// rebuild (content changed or the doc is new).
    async fn sync_doc(&self, item: &IngestItem) -> Result<bool, EngineError> {
        let path_str = item.path.to_string_lossy().to_string();
        let existing = self.chunk_store.get_doc_by_path(&path_str).await?;

        if let Some(doc) = &existing {
            if doc.mtime == item.mtime {
                return Ok(false);
            }
            if doc.sha1 == item.sha1 {
                let updated = DocRecord { mtime: item.mtime, ..doc.clone() };
                self.chunk_store.upsert_doc(&updated).await?;
                return Ok(false);
            }
        }

        let parsed = match parse_file(&item.path) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path_str, error = %e, "skipping file during index build");
                return Ok(false);
            }
        };

        let windows = chunk_text(&parsed.text, self.chunk_size, self.chunk_overlap);
        let doc_id = item.doc_id.clone();
        let chunks: Vec<ChunkRecord> = windows
            .into_iter()
            .enumerate()
            .map(|(idx, w)| ChunkRecord {
                chunk_id: ChunkRecord::make_id(&doc_id, idx as i64),
                doc_id: doc_id.clone(),
                path: path_str.clone(),
                idx: idx as i64,
                start: w.start as i64,
                end: w.end as i64,
                text: w.text,
            })
            .collect();

        let doc = DocRecord {
            doc_id,
            path: path_str.clone(),
            mtime: item.mtime,
            sha1: item.sha1.clone(),
            mime: mime_guess::from_path(&item.path).first_or_octet_stream().essence_str().to_string(),
        };

        self.chunk_store.rebuild_doc(&doc, &chunks).await?;
        debug!(path = %path_str, chunk_count = chunks.len(), "re-chunked document");
        Ok(true)
    }

    /// Ensures the on-disk index is loaded, embeds the query, runs vector
    /// search over `max(top_k, candidates_k)` candidates, resolves their
    /// text, reranks, and returns the first `top_k` (§4.9).
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Snippet>, EngineError> {
        {
            let mut idx = self.index.lock().expect("index lock poisoned");
            if idx.count() == 0 && index::exists(&self.index_prefix) {
                idx.load(&self.index_prefix)?;
            }
        }

        let query_vec = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let k = self.top_k.max(self.candidates_k);
        let hits = {
            let idx = self.index.lock().expect("index lock poisoned");
            if idx.count() == 0 {
                return Ok(Vec::new());
            }
            let k = k.min(idx.count());
            idx.search(std::slice::from_ref(&query_vec), k)?
        };

        let Some(top_hits) = hits.into_iter().next() else {
            return Ok(Vec::new());
        };

        let all_chunks = self.chunk_store.get_all_chunks().await?;
        let by_id: std::collections::HashMap<&str, &ChunkRecord> =
            all_chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();

        let candidates: Vec<Candidate> = top_hits
            .into_iter()
            .filter_map(|hit| {
                by_id.get(hit.id.as_str()).map(|chunk| Candidate {
                    chunk_id: hit.id.clone(),
                    path: chunk.path.clone(),
                    score: hit.score,
                    text: chunk.text.clone(),
                })
            })
            .collect();

        let reranked = rerank(query, candidates, self.rerank_alpha);

        Ok(reranked
            .into_iter()
            .take(self.top_k)
            .map(|c| Snippet { path: c.path, chunk_id: c.chunk_id, score: c.score, text: c.text })
            .collect())
    }

    /// `"[i] path (score=s.ssss)\n<text>\n\n"` blocks, 1-based and stable
    /// across the returned prefix, stopping before `max_chars` is exceeded.
    pub fn format_for_prompt(snips: &[Snippet], max_chars: usize) -> String {
        let mut out = String::new();
        for (i, s) in snips.iter().enumerate() {
            let block = format!("[{}] {} (score={:.4})\n{}\n\n", i + 1, s.path, s.score, s.text);
            if out.len() + block.len() > max_chars {
                break;
            }
            out.push_str(&block);
        }
        out
    }

    pub fn index_path(&self) -> &Path {
        &self.index_prefix
    }
}
