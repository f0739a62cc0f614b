//! Vector Index (§4.5): persistent, append/rebuild top-k inner-product
//! search over unit vectors. A native ANN library is used when compiled in
//! (`ann-index` feature), otherwise a brute-force fallback.

pub mod brute_force;
pub mod hnsw;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub use brute_force::BruteForceIndex;
pub use hnsw::HnswIndex;

/// Sidecar metadata persisted alongside the index payload (§4.5, §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMeta {
    pub dim: usize,
    pub metric: String,
    pub backend: String,
    pub count: usize,
}

/// A single top-k match.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub score: f32,
}

/// Common contract for both the brute-force fallback and the native ANN
/// backend.
pub trait VectorIndex: Send + Sync {
    /// Replaces any in-memory state. Errors on a vectors/ids length
    /// mismatch or a dimension mismatch against the index's configured
    /// dimension.
    fn build(&mut self, vectors: Vec<Vec<f32>>, ids: Vec<String>) -> Result<(), EngineError>;

    /// Writes the sidecar metadata file and the backend-specific payload to
    /// `prefix` (e.g. `prefix` = `.../vectors.idx`).
    fn save(&self, prefix: &Path) -> Result<(), EngineError>;

    /// Loads a previously saved index from `prefix`. `StorageCorrupt` if the
    /// files are partially present or inconsistent.
    fn load(&mut self, prefix: &Path) -> Result<(), EngineError>;

    /// Top-`k` inner-product search. `k` must be in `(0, count]`.
    fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<IndexHit>>, EngineError>;

    fn count(&self) -> usize;

    fn backend_name(&self) -> &'static str;
}

/// True only when both the metadata file and the backend-specific payload
/// file are present.
pub fn exists(prefix: &Path) -> bool {
    meta_path(prefix).is_file() && prefix.is_file()
}

pub fn meta_path(prefix: &Path) -> PathBuf {
    let mut p = prefix.as_os_str().to_owned();
    p.push(".meta.json");
    PathBuf::from(p)
}

pub fn ids_path(prefix: &Path) -> PathBuf {
    let mut p = prefix.as_os_str().to_owned();
    p.push(".ids.txt");
    PathBuf::from(p)
}

pub fn read_meta(prefix: &Path) -> Result<IndexMeta, EngineError> {
    let path = meta_path(prefix);
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::StorageCorrupt(format!("invalid index metadata: {e}")))
}

pub fn write_meta(prefix: &Path, meta: &IndexMeta) -> Result<(), EngineError> {
    let path = meta_path(prefix);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(meta)
        .map_err(|e| EngineError::StorageCorrupt(e.to_string()))?;
    std::fs::write(path, raw)?;
    Ok(())
}

/// Constructs the fallback index unless the `ann-index` feature selects the
/// native ANN backend and the runtime config requests it.
pub fn build_index(dim: usize, prefer_ann: bool) -> Box<dyn VectorIndex> {
    if prefer_ann && HnswIndex::is_available() {
        return Box::new(HnswIndex::new(dim));
    }
    Box::new(BruteForceIndex::new(dim))
}
