//! Native ANN backend (§4.5) over `usearch`, enabled by the `ann-index`
//! feature: a real backend behind the feature flag, a stub reporting
//! unavailable otherwise, both implementing the shared `VectorIndex` trait
//! so callers never branch on which one is active.

use std::path::Path;

#[cfg(feature = "ann-index")]
use std::collections::HashMap;

use crate::error::EngineError;
use crate::index::{ids_path, meta_path, read_meta, write_meta, IndexHit, IndexMeta, VectorIndex};

#[cfg(feature = "ann-index")]
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

pub struct HnswIndex {
    #[cfg(feature = "ann-index")]
    inner: Option<Index>,
    #[cfg(feature = "ann-index")]
    id_of_key: HashMap<u64, String>,
    #[cfg(feature = "ann-index")]
    next_key: u64,
    dim: usize,
}

impl HnswIndex {
    #[cfg(feature = "ann-index")]
    pub fn new(dim: usize) -> Self {
        Self {
            inner: None,
            id_of_key: HashMap::new(),
            next_key: 0,
            dim,
        }
    }

    #[cfg(not(feature = "ann-index"))]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub const fn is_available() -> bool {
        cfg!(feature = "ann-index")
    }

    #[cfg(feature = "ann-index")]
    fn new_inner(&self) -> Result<Index, EngineError> {
        let options = IndexOptions {
            dimensions: self.dim,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };
        Index::new(&options)
            .map_err(|e| EngineError::BackendUnavailable(format!("usearch index init failed: {e}")))
    }
}

#[cfg(feature = "ann-index")]
impl VectorIndex for HnswIndex {
    fn build(&mut self, vectors: Vec<Vec<f32>>, ids: Vec<String>) -> Result<(), EngineError> {
        if vectors.len() != ids.len() {
            return Err(EngineError::StorageCorrupt(format!(
                "vectors/ids length mismatch: {} != {}",
                vectors.len(),
                ids.len()
            )));
        }

        let index = self.new_inner()?;
        index
            .reserve(vectors.len().max(1))
            .map_err(|e| EngineError::BackendUnavailable(format!("usearch reserve failed: {e}")))?;

        let mut id_of_key = HashMap::with_capacity(ids.len());
        for (i, (vector, id)) in vectors.into_iter().zip(ids.into_iter()).enumerate() {
            if vector.len() != self.dim {
                return Err(EngineError::StorageCorrupt(format!(
                    "vector dimension mismatch: expected {}, got {}",
                    self.dim,
                    vector.len()
                )));
            }
            let key = i as u64;
            index
                .add(key, &vector)
                .map_err(|e| EngineError::BackendUnavailable(format!("usearch add failed: {e}")))?;
            id_of_key.insert(key, id);
        }

        self.next_key = id_of_key.len() as u64;
        self.id_of_key = id_of_key;
        self.inner = Some(index);
        Ok(())
    }

    fn save(&self, prefix: &Path) -> Result<(), EngineError> {
        let index = self
            .inner
            .as_ref()
            .ok_or_else(|| EngineError::StorageCorrupt("index has not been built".to_string()))?;

        if let Some(parent) = prefix.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = prefix
            .to_str()
            .ok_or_else(|| EngineError::StorageCorrupt("index path is not valid UTF-8".to_string()))?;
        index
            .save(path_str)
            .map_err(|e| EngineError::StorageCorrupt(format!("usearch save failed: {e}")))?;

        let mut ids_file = std::fs::File::create(ids_path(prefix))?;
        use std::io::Write as _;
        let mut ordered: Vec<(&u64, &String)> = self.id_of_key.iter().collect();
        ordered.sort_by_key(|(key, _)| **key);
        for (_, id) in ordered {
            writeln!(ids_file, "{id}")?;
        }

        write_meta(
            prefix,
            &IndexMeta {
                dim: self.dim,
                metric: "inner_product".to_string(),
                backend: self.backend_name().to_string(),
                count: self.id_of_key.len(),
            },
        )
    }

    fn load(&mut self, prefix: &Path) -> Result<(), EngineError> {
        if !meta_path(prefix).is_file() || !prefix.is_file() {
            return Err(EngineError::StorageCorrupt(
                "index payload or metadata file missing".to_string(),
            ));
        }

        let meta = read_meta(prefix)?;
        if meta.dim != self.dim {
            return Err(EngineError::StorageCorrupt(format!(
                "index dimension {} does not match configured dimension {}",
                meta.dim, self.dim
            )));
        }

        let index = self.new_inner()?;
        let path_str = prefix
            .to_str()
            .ok_or_else(|| EngineError::StorageCorrupt("index path is not valid UTF-8".to_string()))?;
        index
            .load(path_str)
            .map_err(|e| EngineError::StorageCorrupt(format!("usearch load failed: {e}")))?;

        let ids_raw = std::fs::read_to_string(ids_path(prefix))?;
        let ids: Vec<String> = ids_raw.lines().map(|l| l.to_string()).collect();
        if ids.len() != meta.count {
            return Err(EngineError::StorageCorrupt(format!(
                "id count {} does not match metadata count {}",
                ids.len(),
                meta.count
            )));
        }

        let id_of_key = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (i as u64, id))
            .collect::<HashMap<_, _>>();

        self.next_key = id_of_key.len() as u64;
        self.id_of_key = id_of_key;
        self.inner = Some(index);
        Ok(())
    }

    fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<IndexHit>>, EngineError> {
        if k == 0 {
            return Err(EngineError::BadRequest("k must be > 0".to_string()));
        }
        let index = self
            .inner
            .as_ref()
            .ok_or_else(|| EngineError::StorageCorrupt("index has not been built".to_string()))?;

        let mut out = Vec::with_capacity(queries.len());
        for q in queries {
            if q.len() != self.dim {
                return Err(EngineError::StorageCorrupt(format!(
                    "query dimension mismatch: expected {}, got {}",
                    self.dim,
                    q.len()
                )));
            }

            let results = index
                .search(q, k)
                .map_err(|e| EngineError::BackendUnavailable(format!("usearch search failed: {e}")))?;

            let hits = results
                .keys
                .iter()
                .zip(results.distances.iter())
                .filter_map(|(key, distance)| {
                    self.id_of_key.get(key).map(|id| IndexHit {
                        id: id.clone(),
                        score: *distance,
                    })
                })
                .collect();
            out.push(hits);
        }
        Ok(out)
    }

    fn count(&self) -> usize {
        self.id_of_key.len()
    }

    fn backend_name(&self) -> &'static str {
        "hnsw"
    }
}

#[cfg(not(feature = "ann-index"))]
impl VectorIndex for HnswIndex {
    fn build(&mut self, _vectors: Vec<Vec<f32>>, _ids: Vec<String>) -> Result<(), EngineError> {
        Err(EngineError::BackendUnavailable("ann-index feature is not compiled in".to_string()))
    }

    fn save(&self, _prefix: &Path) -> Result<(), EngineError> {
        Err(EngineError::BackendUnavailable("ann-index feature is not compiled in".to_string()))
    }

    fn load(&mut self, _prefix: &Path) -> Result<(), EngineError> {
        Err(EngineError::BackendUnavailable("ann-index feature is not compiled in".to_string()))
    }

    fn search(&self, _queries: &[Vec<f32>], _k: usize) -> Result<Vec<Vec<IndexHit>>, EngineError> {
        Err(EngineError::BackendUnavailable("ann-index feature is not compiled in".to_string()))
    }

    fn count(&self) -> usize {
        0
    }

    fn backend_name(&self) -> &'static str {
        "hnsw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_available_matches_feature_flag() {
        assert_eq!(HnswIndex::is_available(), cfg!(feature = "ann-index"));
    }

    #[cfg(not(feature = "ann-index"))]
    #[test]
    fn stub_reports_backend_unavailable() {
        let mut idx = HnswIndex::new(4);
        assert!(idx.build(vec![vec![0.0; 4]], vec!["a".to_string()]).is_err());
        assert_eq!(idx.count(), 0);
        assert_eq!(idx.backend_name(), "hnsw");
    }
}
