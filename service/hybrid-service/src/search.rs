//! Hybrid Search Executor (C7): spec §4.7's seven-step query algorithm.
//!
//! The "best retrieval score" threshold filter (step 5) is applied to the
//! vector retrieval lists at the point they're produced: `VectorIndex::search`
//! already takes a `tau` cutoff as part of its contract (chunking-store's
//! C2), so passing `threshold` straight through there is both the simplest
//! implementation and the one the index itself was built to support. BM25
//! ranks have no comparable `[0, 1]` scale to compare against an embedding
//! similarity threshold, so lexical-only candidates are never filtered by it
//! — a chunk that only the lexical retriever found still reaches fusion.

use std::sync::Arc;

use chunking_store::Store;
use embedding_provider::{Embedder, Reranker};
use serde::{Deserialize, Serialize};

use crate::cache::QueryCache;
use crate::expansion::ExpansionClient;
use crate::fusion::{reciprocal_rank_fusion, RankedHit};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub source: String,
    pub page: Option<i64>,
    pub content: String,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub threshold: Option<f32>,
    #[serde(default = "default_true")]
    pub use_hybrid: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

pub struct HybridSearchExecutor {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    reranker_top_n: usize,
    expansion: Option<Arc<ExpansionClient>>,
    cache: QueryCache,
}

impl HybridSearchExecutor {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        reranker_top_n: usize,
        expansion: Option<Arc<ExpansionClient>>,
        cache: QueryCache,
    ) -> Self {
        Self { store, embedder, reranker, reranker_top_n, expansion, cache }
    }

    pub fn query(&self, req: &QueryRequest) -> QueryResponse {
        if let Some(cached) = self.cache.get(&req.query, req.top_k, req.threshold, req.use_hybrid) {
            return cached;
        }

        let mut query_variants = vec![req.query.clone()];
        if let Some(expansion) = &self.expansion {
            query_variants.extend(expansion.expand(&self.store, &req.query));
        }

        let candidate_n = std::cmp::max(req.top_k, self.reranker_top_n) * 2;
        let mut lists: Vec<Vec<RankedHit>> = Vec::new();

        for variant in &query_variants {
            match self.embedder.embed(variant) {
                Ok(vector) => {
                    let hits = self.store.vectors.search(&vector, candidate_n, req.threshold);
                    lists.push(self.hydrate_vector_hits(hits));
                }
                Err(err) => {
                    tracing::warn!(error = ?err, variant, "embedding failed for query variant; vector retrieval skipped");
                }
            }

            if req.use_hybrid {
                match self.store.lexical.search(variant, candidate_n) {
                    Ok(hits) => lists.push(self.hydrate_lexical_hits(hits)),
                    Err(err) => tracing::warn!(error = ?err, variant, "lexical retrieval failed; contributing zero results"),
                }
            }
        }

        let fused = reciprocal_rank_fusion(&lists);

        let results = if let Some(reranker) = &self.reranker {
            self.rerank(reranker.as_ref(), &req.query, &fused, req.top_k)
        } else {
            fused
                .into_iter()
                .take(req.top_k)
                .map(|c| SearchHit {
                    source: c.detail.file_path,
                    page: c.detail.page,
                    content: c.detail.content,
                    fused_score: c.rrf_score,
                    rerank_score: None,
                })
                .collect()
        };

        let response = QueryResponse { query: req.query.clone(), results };
        self.cache.put(&req.query, req.top_k, req.threshold, req.use_hybrid, response.clone());
        response
    }

    fn hydrate_vector_hits(&self, hits: Vec<chunking_store::VectorHit>) -> Vec<RankedHit> {
        let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
        let by_id = self.lookup_details(&ids);
        hits.into_iter()
            .filter_map(|h| by_id.get(&h.chunk_id).map(|d| RankedHit { chunk_id: h.chunk_id, detail: d.clone(), vector_score: Some(h.score) }))
            .collect()
    }

    fn hydrate_lexical_hits(&self, hits: Vec<chunking_store::LexicalHit>) -> Vec<RankedHit> {
        let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
        let by_id = self.lookup_details(&ids);
        hits.into_iter()
            .filter_map(|h| by_id.get(&h.chunk_id).map(|d| RankedHit { chunk_id: h.chunk_id, detail: d.clone(), vector_score: None }))
            .collect()
    }

    fn lookup_details(&self, ids: &[i64]) -> std::collections::HashMap<i64, chunking_store::ChunkDetail> {
        match self.store.sqlite.get_chunks_by_ids(ids) {
            Ok(details) => details.into_iter().map(|d| (d.chunk_id, d)).collect(),
            Err(err) => {
                tracing::warn!(error = ?err, "failed to hydrate chunk details for retrieval hits");
                std::collections::HashMap::new()
            }
        }
    }

    fn rerank(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        fused: &[crate::fusion::FusedCandidate],
        top_k: usize,
    ) -> Vec<SearchHit> {
        let top: Vec<&crate::fusion::FusedCandidate> = fused.iter().take(self.reranker_top_n).collect();
        let documents: Vec<&str> = top.iter().map(|c| c.detail.content.as_str()).collect();

        match reranker.rerank(query, &documents, top_k) {
            Ok(scored) => scored
                .into_iter()
                .filter_map(|r| {
                    top.get(r.index).map(|c| SearchHit {
                        source: c.detail.file_path.clone(),
                        page: c.detail.page,
                        content: c.detail.content.clone(),
                        fused_score: c.rrf_score,
                        rerank_score: Some(r.score),
                    })
                })
                .collect(),
            Err(err) => {
                tracing::warn!(error = ?err, "reranker failed; passing through fused order");
                top.into_iter()
                    .take(top_k)
                    .map(|c| SearchHit {
                        source: c.detail.file_path.clone(),
                        page: c.detail.page,
                        content: c.detail.content.clone(),
                        fused_score: c.rrf_score,
                        rerank_score: None,
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::{ChunkId, ChunkRecord, DocumentId};
    use embedding_provider::EmbedderInfo;
    use std::collections::BTreeMap;

    struct FakeEmbedder {
        info: EmbedderInfo,
    }

    impl Embedder for FakeEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, embedding_provider::EmbedderError> {
            let mut v = vec![0.0f32; self.info.dimension];
            for (i, b) in text.bytes().enumerate() {
                v[i % v.len()] += b as f32;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
            Ok(v.into_iter().map(|x| x / norm).collect())
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, embedding_provider::EmbedderError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn info(&self) -> &EmbedderInfo {
            &self.info
        }
    }

    fn sample_chunk(doc_id: &DocumentId, index: u32, text: &str) -> ChunkRecord {
        ChunkRecord {
            schema_version: chunk_model::SCHEMA_MAJOR,
            doc_id: doc_id.clone(),
            chunk_id: ChunkId::new(doc_id, index),
            chunk_index: index,
            source_uri: doc_id.as_str().to_string(),
            source_mime: "text/plain".to_string(),
            extracted_at: "2026-01-01T00:00:00Z".to_string(),
            page_start: None,
            page_end: None,
            text: text.to_string(),
            section_path: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    fn build_executor() -> HybridSearchExecutor {
        let dim = 16;
        let store = Arc::new(Store::open_in_memory(dim).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder {
            info: EmbedderInfo {
                provider: embedding_provider::ProviderKind::OnnxStdIo,
                embedding_model_id: "fake".into(),
                dimension: dim,
                text_repr_version: "v1".into(),
            },
        });

        let doc_id = DocumentId::from_path("fox.txt");
        let chunk = sample_chunk(&doc_id, 0, "the quick brown fox jumps over the lazy dog");
        let vector = embedder.embed(&chunk.text).unwrap();
        store.add_document("fox.txt", "h1", "txt", &[chunk], &[vector]).unwrap();

        HybridSearchExecutor::new(store, embedder, None, 20, None, QueryCache::new(10))
    }

    #[test]
    fn finds_indexed_chunk_by_hybrid_query() {
        let executor = build_executor();
        let response = executor.query(&QueryRequest { query: "fox".into(), top_k: 5, threshold: None, use_hybrid: true });
        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].content.contains("fox"));
    }

    #[test]
    fn repeated_identical_query_hits_cache() {
        let executor = build_executor();
        let req = QueryRequest { query: "fox".into(), top_k: 5, threshold: None, use_hybrid: true };
        let first = executor.query(&req);
        let second = executor.query(&req);
        assert_eq!(first.results.len(), second.results.len());
    }

    #[test]
    fn vector_only_mode_skips_lexical_retrieval() {
        let executor = build_executor();
        let response = executor.query(&QueryRequest { query: "fox".into(), top_k: 5, threshold: None, use_hybrid: false });
        assert_eq!(response.results.len(), 1);
    }
}
