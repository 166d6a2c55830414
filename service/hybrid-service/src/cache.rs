//! Query result cache (spec §4.7 step 1): an LRU keyed by the normalized
//! query text plus the retrieval parameters that can change what comes
//! back for the same text.

use std::sync::Mutex;

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::search::QueryResponse;

fn normalize_key(text: &str, top_k: usize, threshold: Option<f32>, use_hybrid: bool) -> String {
    let normalized_text = text.trim().to_lowercase();
    let threshold_bits = threshold.map(f32::to_bits).unwrap_or(0);
    format!("{normalized_text}\u{1f}{top_k}\u{1f}{threshold_bits}\u{1f}{use_hybrid}")
}

pub struct QueryCache {
    inner: Option<Mutex<LruCache<String, QueryResponse>>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn get(&self, text: &str, top_k: usize, threshold: Option<f32>, use_hybrid: bool) -> Option<QueryResponse> {
        let cache = self.inner.as_ref()?;
        let key = normalize_key(text, top_k, threshold, use_hybrid);
        cache.lock().expect("query cache lock poisoned").get(&key).cloned()
    }

    pub fn put(&self, text: &str, top_k: usize, threshold: Option<f32>, use_hybrid: bool, response: QueryResponse) {
        let Some(cache) = self.inner.as_ref() else { return };
        let key = normalize_key(text, top_k, threshold, use_hybrid);
        cache.lock().expect("query cache lock poisoned").put(key, response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchHit;

    fn sample_response(query: &str) -> QueryResponse {
        QueryResponse {
            query: query.to_string(),
            results: vec![SearchHit {
                source: "a.txt".into(),
                page: None,
                content: "hello".into(),
                fused_score: 1.0,
                rerank_score: None,
            }],
        }
    }

    #[test]
    fn hit_is_case_and_whitespace_insensitive() {
        let cache = QueryCache::new(10);
        cache.put("  Hello World  ", 5, None, true, sample_response("Hello World"));
        assert!(cache.get("hello world", 5, None, true).is_some());
    }

    #[test]
    fn distinct_top_k_is_a_distinct_key() {
        let cache = QueryCache::new(10);
        cache.put("hello", 5, None, true, sample_response("hello"));
        assert!(cache.get("hello", 10, None, true).is_none());
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = QueryCache::disabled();
        cache.put("hello", 5, None, true, sample_response("hello"));
        assert!(cache.get("hello", 5, None, true).is_none());
    }
}
