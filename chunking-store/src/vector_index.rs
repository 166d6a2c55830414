//! Vector Index (C2): approximate nearest-neighbor search over
//! L2-normalized float32 vectors, plus an in-memory brute-force alternative
//! that is interchangeable behind the same `search(vec, k, tau)` contract.
//!
//! Deletion does not remove a vector from the HNSW graph in place (the
//! underlying library has no efficient delete); instead the id is recorded
//! as a tombstone and filtered out of every subsequent search. Tombstones
//! accumulate until `rebuild_from` reconstructs the index from scratch.

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use hnsw_rs::dist::DistCosine;
use hnsw_rs::hnswio::{HnswIo, ReloadOptions};
use hnsw_rs::prelude::Hnsw;

use crate::error::{StoreError, StoreResult};

/// A single search hit: the chunk's durable rowid and a similarity score in
/// `[-1.0, 1.0]` (cosine similarity, i.e. `1.0 - cosine_distance`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub chunk_id: i64,
    pub score: f32,
}

/// Shared contract between the HNSW-backed index and the in-memory
/// brute-force index. Selection between the two is a config toggle (spec
/// §4.2); callers never need to know which one they have.
pub trait VectorIndex: Send + Sync {
    fn add(&self, chunk_id: i64, vec: &[f32]) -> StoreResult<()>;
    fn delete(&self, chunk_id: i64);
    fn search(&self, query_vec: &[f32], k: usize, tau: Option<f32>) -> Vec<VectorHit>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn dim(&self) -> usize;

    /// Discards whatever is currently indexed and reconstructs from
    /// `vectors`, clearing any accumulated tombstones. Used by the on-demand
    /// HNSW rebuild maintenance operation (spec §4.8.6).
    fn rebuild_from(&self, vectors: &[(i64, Vec<f32>)]) -> StoreResult<()>;

    /// Dumps the index to `dir` if the implementation is disk-backed.
    /// In-memory implementations no-op.
    fn persist(&self, dir: &Path) -> StoreResult<()> {
        let _ = dir;
        Ok(())
    }
}

const HNSW_BASENAME: &str = "vectors";
const HNSW_MAX_NB_CONNECTION: usize = 16;
const HNSW_MAX_ELEMENTS: usize = 2_000_000;
const HNSW_MAX_LAYER: usize = 16;
const HNSW_EF_CONSTRUCTION: usize = 200;
const HNSW_EF_SEARCH: usize = 64;

pub struct HnswVectorIndex {
    dim: usize,
    inner: RwLock<Hnsw<'static, f32, DistCosine>>,
    tombstones: RwLock<HashSet<i64>>,
    count: RwLock<usize>,
}

impl HnswVectorIndex {
    pub fn new(dim: usize) -> Self {
        let hnsw = Hnsw::<f32, DistCosine>::new(
            HNSW_MAX_NB_CONNECTION,
            HNSW_MAX_ELEMENTS,
            HNSW_MAX_LAYER,
            HNSW_EF_CONSTRUCTION,
            DistCosine {},
        );
        Self { dim, inner: RwLock::new(hnsw), tombstones: RwLock::new(HashSet::new()), count: RwLock::new(0) }
    }

    /// Reload a previously-dumped index from `dir` (files
    /// `vectors.hnsw.graph` / `vectors.hnsw.data`). Missing files are not an
    /// error — a fresh empty index is returned, matching first-boot
    /// behavior.
    pub fn load_or_new(dir: &Path, dim: usize) -> StoreResult<Self> {
        let graph_path = dir.join(format!("{HNSW_BASENAME}.hnsw.graph"));
        if !graph_path.exists() {
            return Ok(Self::new(dim));
        }
        let mut reloader = HnswIo::new(dir, HNSW_BASENAME);
        let hnsw = reloader
            .load_hnsw_with_dist(ReloadOptions::default(), DistCosine {})
            .map_err(|e| StoreError::VectorIndex(format!("failed to reload hnsw index: {e}")))?;
        let count = hnsw.get_nb_point();
        Ok(Self { dim, inner: RwLock::new(hnsw), tombstones: RwLock::new(HashSet::new()), count: RwLock::new(count) })
    }

    pub fn save(&self, dir: &Path) -> StoreResult<()> {
        std::fs::create_dir_all(dir)?;
        let inner = self.inner.read().expect("hnsw lock poisoned");
        inner
            .file_dump(dir, HNSW_BASENAME)
            .map_err(|e| StoreError::VectorIndex(format!("failed to dump hnsw index: {e}")))?;
        Ok(())
    }

}

impl VectorIndex for HnswVectorIndex {
    fn add(&self, chunk_id: i64, vec: &[f32]) -> StoreResult<()> {
        if vec.len() != self.dim {
            return Err(StoreError::DimensionMismatch { expected: self.dim, actual: vec.len() });
        }
        self.inner.write().expect("hnsw lock poisoned").insert((vec, chunk_id as usize));
        *self.count.write().expect("count lock poisoned") += 1;
        Ok(())
    }

    fn delete(&self, chunk_id: i64) {
        self.tombstones.write().expect("tombstone lock poisoned").insert(chunk_id);
    }

    fn search(&self, query_vec: &[f32], k: usize, tau: Option<f32>) -> Vec<VectorHit> {
        let tombstones = self.tombstones.read().expect("tombstone lock poisoned");
        // Overshoot the candidate count so that filtering tombstoned ids
        // still leaves us `k` results when possible.
        let overshoot = k + tombstones.len().min(k.max(16));
        let neighbours = self.inner.read().expect("hnsw lock poisoned").search(query_vec, overshoot, HNSW_EF_SEARCH);
        neighbours
            .into_iter()
            .filter(|n| !tombstones.contains(&(n.d_id as i64)))
            .map(|n| VectorHit { chunk_id: n.d_id as i64, score: 1.0 - n.distance })
            .filter(|hit| tau.map_or(true, |t| hit.score >= t))
            .take(k)
            .collect()
    }

    fn len(&self) -> usize {
        let total = *self.count.read().expect("count lock poisoned");
        let dead = self.tombstones.read().expect("tombstone lock poisoned").len();
        total.saturating_sub(dead)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    /// Discard the current graph and rebuild from scratch over
    /// `(chunk_id, embedding)` pairs, e.g. supplied by a self-heal rebuild
    /// pass. Clears tombstones, since a fresh graph has none.
    fn rebuild_from(&self, vectors: &[(i64, Vec<f32>)]) -> StoreResult<()> {
        let fresh = Hnsw::<f32, DistCosine>::new(
            HNSW_MAX_NB_CONNECTION,
            HNSW_MAX_ELEMENTS,
            HNSW_MAX_LAYER,
            HNSW_EF_CONSTRUCTION,
            DistCosine {},
        );
        for (chunk_id, v) in vectors {
            fresh.insert((v.as_slice(), *chunk_id as usize));
        }
        *self.inner.write().expect("hnsw lock poisoned") = fresh;
        *self.tombstones.write().expect("tombstone lock poisoned") = HashSet::new();
        *self.count.write().expect("count lock poisoned") = vectors.len();
        Ok(())
    }

    fn persist(&self, dir: &Path) -> StoreResult<()> {
        self.save(dir)
    }
}

/// Brute-force alternative: loads every vector into a contiguous matrix and
/// scores by dot product (vectors are pre-normalized, so dot product ==
/// cosine similarity). O(n*D) per query but avoids per-row deserialization
/// overhead, which dominates on small corpora.
pub struct InMemoryVectorIndex {
    dim: usize,
    rows: RwLock<Vec<(i64, Vec<f32>)>>,
}

impl InMemoryVectorIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, rows: RwLock::new(Vec::new()) }
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn add(&self, chunk_id: i64, vec: &[f32]) -> StoreResult<()> {
        if vec.len() != self.dim {
            return Err(StoreError::DimensionMismatch { expected: self.dim, actual: vec.len() });
        }
        let mut rows = self.rows.write().expect("in-memory index lock poisoned");
        if let Some(existing) = rows.iter_mut().find(|(id, _)| *id == chunk_id) {
            existing.1 = vec.to_vec();
        } else {
            rows.push((chunk_id, vec.to_vec()));
        }
        Ok(())
    }

    fn delete(&self, chunk_id: i64) {
        self.rows.write().expect("in-memory index lock poisoned").retain(|(id, _)| *id != chunk_id);
    }

    fn search(&self, query_vec: &[f32], k: usize, tau: Option<f32>) -> Vec<VectorHit> {
        let rows = self.rows.read().expect("in-memory index lock poisoned");
        let mut scored: Vec<VectorHit> = rows
            .iter()
            .map(|(id, v)| {
                let dot: f32 = v.iter().zip(query_vec.iter()).map(|(a, b)| a * b).sum();
                VectorHit { chunk_id: *id, score: dot }
            })
            .filter(|hit| tau.map_or(true, |t| hit.score >= t))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    fn len(&self) -> usize {
        self.rows.read().expect("in-memory index lock poisoned").len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn rebuild_from(&self, vectors: &[(i64, Vec<f32>)]) -> StoreResult<()> {
        *self.rows.write().expect("in-memory index lock poisoned") = vectors.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn in_memory_index_ranks_closest_vector_first() {
        let idx = InMemoryVectorIndex::new(3);
        idx.add(1, &unit(&[1.0, 0.0, 0.0])).unwrap();
        idx.add(2, &unit(&[0.0, 1.0, 0.0])).unwrap();
        idx.add(3, &unit(&[0.9, 0.1, 0.0])).unwrap();

        let hits = idx.search(&unit(&[1.0, 0.0, 0.0]), 2, None);
        assert_eq!(hits[0].chunk_id, 1);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn in_memory_index_delete_removes_from_results() {
        let idx = InMemoryVectorIndex::new(2);
        idx.add(1, &unit(&[1.0, 0.0])).unwrap();
        idx.delete(1);
        assert!(idx.search(&unit(&[1.0, 0.0]), 5, None).is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let idx = InMemoryVectorIndex::new(3);
        let err = idx.add(1, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 2 }));
    }
}
