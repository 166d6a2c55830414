//! Reciprocal Rank Fusion (spec §4.7 step 4): combines any number of ranked
//! retrieval lists (one per query variant per retriever) into a single
//! ordering, keyed so the same chunk surfaced by both retrievers — or by
//! different phrasings of the same query — collapses into one candidate.

use std::cmp::Ordering;
use std::collections::HashMap;

use chunking_store::ChunkDetail;

pub const RRF_K: f32 = 60.0;
const CONTENT_PREFIX_LEN: usize = 120;

/// One retrieval hit, in rank order within its own list. `vector_score` is
/// `Some` only for hits produced by a vector-search list; it exists purely
/// to break RRF score ties (spec step 4) and to carry the similarity score
/// through to the final response.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub chunk_id: i64,
    pub detail: ChunkDetail,
    pub vector_score: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub chunk_id: i64,
    pub detail: ChunkDetail,
    pub rrf_score: f32,
    pub best_vector_score: Option<f32>,
}

type FusionKey = (String, Option<i64>, String);

fn fusion_key(detail: &ChunkDetail) -> FusionKey {
    let prefix: String = detail.content.chars().take(CONTENT_PREFIX_LEN).collect();
    (detail.file_path.clone(), detail.page, prefix)
}

/// Fuses `lists` (each already sorted best-first) by `1/(RRF_K + rank)`,
/// summed per candidate across every list it appears in. Ties broken by the
/// higher vector score, then left in `HashMap` iteration order (no further
/// tie-break is specified).
pub fn reciprocal_rank_fusion(lists: &[Vec<RankedHit>]) -> Vec<FusedCandidate> {
    let mut fused: HashMap<FusionKey, FusedCandidate> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let key = fusion_key(&hit.detail);
            let contribution = 1.0 / (RRF_K + (rank + 1) as f32);
            let entry = fused.entry(key).or_insert_with(|| FusedCandidate {
                chunk_id: hit.chunk_id,
                detail: hit.detail.clone(),
                rrf_score: 0.0,
                best_vector_score: None,
            });
            entry.rrf_score += contribution;
            if let Some(vs) = hit.vector_score {
                entry.best_vector_score = Some(entry.best_vector_score.map_or(vs, |cur| cur.max(vs)));
            }
        }
    }

    let mut out: Vec<FusedCandidate> = fused.into_values().collect();
    out.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.best_vector_score.partial_cmp(&a.best_vector_score).unwrap_or(Ordering::Equal))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(id: i64, path: &str, content: &str) -> ChunkDetail {
        ChunkDetail { chunk_id: id, file_path: path.to_string(), content: content.to_string(), page: None }
    }

    #[test]
    fn same_chunk_in_both_lists_outranks_single_list_hits() {
        let shared = detail(1, "a.txt", "the quick brown fox");
        let only_vector = detail(2, "b.txt", "lorem ipsum");
        let vector_list = vec![
            RankedHit { chunk_id: 1, detail: shared.clone(), vector_score: Some(0.9) },
            RankedHit { chunk_id: 2, detail: only_vector, vector_score: Some(0.8) },
        ];
        let lexical_list =
            vec![RankedHit { chunk_id: 1, detail: shared, vector_score: None }];

        let fused = reciprocal_rank_fusion(&[vector_list, lexical_list]);
        assert_eq!(fused[0].chunk_id, 1);
        assert!(fused[0].rrf_score > fused[1].rrf_score);
    }

    #[test]
    fn ties_break_on_higher_vector_score() {
        let a = detail(1, "a.txt", "alpha");
        let b = detail(2, "b.txt", "beta");
        let list_a = vec![RankedHit { chunk_id: 1, detail: a, vector_score: Some(0.5) }];
        let list_b = vec![RankedHit { chunk_id: 2, detail: b, vector_score: Some(0.9) }];

        let fused = reciprocal_rank_fusion(&[list_a, list_b]);
        assert_eq!(fused[0].rrf_score, fused[1].rrf_score);
        assert_eq!(fused[0].chunk_id, 2, "higher vector score should win the tie");
    }

    #[test]
    fn fusion_is_symmetric_in_list_order() {
        let a = detail(1, "a.txt", "alpha");
        let b = detail(2, "b.txt", "beta");
        let list_a = vec![RankedHit { chunk_id: 1, detail: a.clone(), vector_score: Some(0.5) }];
        let list_b = vec![RankedHit { chunk_id: 2, detail: b.clone(), vector_score: Some(0.3) }];

        let forward = reciprocal_rank_fusion(&[list_a.clone(), list_b.clone()]);
        let backward = reciprocal_rank_fusion(&[list_b, list_a]);
        assert_eq!(forward[0].chunk_id, backward[0].chunk_id);
        assert_eq!(forward[0].rrf_score, backward[0].rrf_score);
    }
}
