//! Brute-force fallback for the Vector Index (§4.5): used when no native
//! ANN library is compiled in, or when the ANN backend declines to report
//! itself available.

use std::io::Write;
use std::path::Path;

use crate::error::EngineError;
use crate::index::{exists, ids_path, read_meta, write_meta, IndexHit, IndexMeta, VectorIndex};

pub struct BruteForceIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
    ids: Vec<String>,
}

impl BruteForceIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            ids: Vec::new(),
        }
    }
}

impl VectorIndex for BruteForceIndex {
    fn build(&mut self, vectors: Vec<Vec<f32>>, ids: Vec<String>) -> Result<(), EngineError> {
        if vectors.len() != ids.len() {
            return Err(EngineError::StorageCorrupt(format!(
                "vectors/ids length mismatch: {} != {}",
                vectors.len(),
                ids.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dim {
                return Err(EngineError::StorageCorrupt(format!(
                    "vector dimension mismatch: expected {}, got {}",
                    self.dim,
                    v.len()
                )));
            }
        }
        self.vectors = vectors;
        self.ids = ids;
        Ok(())
    }

    fn save(&self, prefix: &Path) -> Result<(), EngineError> {
        if let Some(parent) = prefix.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Dense row-major f32 matrix, little-endian. "Compressed" per §4.5
        // in the loose sense of a flat binary encoding rather than the
        // text/JSON the Chunk Store uses elsewhere.
        let mut payload = Vec::with_capacity(self.vectors.len() * self.dim * 4);
        for row in &self.vectors {
            for x in row {
                payload.extend_from_slice(&x.to_le_bytes());
            }
        }
        std::fs::write(prefix, payload)?;

        let mut ids_file = std::fs::File::create(ids_path(prefix))?;
        for id in &self.ids {
            writeln!(ids_file, "{id}")?;
        }

        write_meta(
            prefix,
            &IndexMeta {
                dim: self.dim,
                metric: "inner_product".to_string(),
                backend: self.backend_name().to_string(),
                count: self.ids.len(),
            },
        )
    }

    fn load(&mut self, prefix: &Path) -> Result<(), EngineError> {
        if !exists(prefix) {
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

        let raw = std::fs::read(prefix)?;
        if raw.len() % 4 != 0 {
            return Err(EngineError::StorageCorrupt("truncated matrix payload".to_string()));
        }
        let floats: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if self.dim == 0 || floats.len() % self.dim != 0 {
            return Err(EngineError::StorageCorrupt("matrix payload not aligned to dim".to_string()));
        }

        let ids_raw = std::fs::read_to_string(ids_path(prefix))?;
        let ids: Vec<String> = ids_raw.lines().map(|l| l.to_string()).collect();

        let row_count = floats.len() / self.dim.max(1);
        if row_count != ids.len() || row_count != meta.count {
            return Err(EngineError::StorageCorrupt(format!(
                "row count mismatch: matrix={row_count} ids={} meta={}",
                ids.len(),
                meta.count
            )));
        }

        self.vectors = floats.chunks(self.dim).map(|c| c.to_vec()).collect();
        self.ids = ids;
        Ok(())
    }

    fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<IndexHit>>, EngineError> {
        if k == 0 {
            return Err(EngineError::BadRequest("k must be > 0".to_string()));
        }

        let mut out = Vec::with_capacity(queries.len());
        for q in queries {
            if q.len() != self.dim {
                return Err(EngineError::StorageCorrupt(format!(
                    "query dimension mismatch: expected {}, got {}",
                    self.dim,
                    q.len()
                )));
            }

            // Q x M^T: dot product of the query against every row.
            let mut scored: Vec<(usize, f32)> = self
                .vectors
                .iter()
                .enumerate()
                .map(|(i, row)| (i, row.iter().zip(q.iter()).map(|(a, b)| a * b).sum::<f32>()))
                .collect();

            // Descending score, stable tie-break by ascending internal index
            // (the enumerate order is already ascending, and sort_by is
            // stable, so equal scores keep their original relative order).
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            let take = k.min(scored.len());
            out.push(
                scored[..take]
                    .iter()
                    .map(|(i, score)| IndexHit {
                        id: self.ids[*i].clone(),
                        score: *score,
                    })
                    .collect(),
            );
        }
        Ok(out)
    }

    fn count(&self) -> usize {
        self.ids.len()
    }

    fn backend_name(&self) -> &'static str {
        "brute_force"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let mag: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / mag).collect()
    }

    #[test]
    fn build_rejects_length_mismatch() {
        let mut idx = BruteForceIndex::new(2);
        let err = idx.build(vec![vec![1.0, 0.0]], vec!["a".to_string(), "b".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn build_rejects_dim_mismatch() {
        let mut idx = BruteForceIndex::new(3);
        let err = idx.build(vec![vec![1.0, 0.0]], vec!["a".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn search_returns_closest_first() {
        let mut idx = BruteForceIndex::new(2);
        idx.build(
            vec![unit(vec![1.0, 0.0]), unit(vec![0.0, 1.0]), unit(vec![0.9, 0.1])],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .unwrap();

        let hits = idx.search(&[unit(vec![1.0, 0.0])], 2).unwrap();
        assert_eq!(hits[0][0].id, "a");
        assert!(hits[0][0].score >= hits[0][1].score);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("vectors.idx");

        let mut idx = BruteForceIndex::new(2);
        idx.build(
            vec![unit(vec![1.0, 0.0]), unit(vec![0.0, 1.0])],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();
        idx.save(&prefix).unwrap();
        assert!(exists(&prefix));

        let mut loaded = BruteForceIndex::new(2);
        loaded.load(&prefix).unwrap();
        assert_eq!(loaded.count(), 2);

        let hits = loaded.search(&[unit(vec![1.0, 0.0])], 1).unwrap();
        assert_eq!(hits[0][0].id, "a");
    }

    #[test]
    fn load_detects_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("missing.idx");
        let mut idx = BruteForceIndex::new(2);
        assert!(idx.load(&prefix).is_err());
    }

    #[test]
    fn search_rejects_zero_k() {
        let mut idx = BruteForceIndex::new(2);
        idx.build(vec![unit(vec![1.0, 0.0])], vec!["a".to_string()]).unwrap();
        assert!(idx.search(&[unit(vec![1.0, 0.0])], 0).is_err());
    }
}
