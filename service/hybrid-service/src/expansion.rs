//! Query expansion (spec §4.7 step 2): an Ollama client that proposes up to
//! three alternative phrasings of a query. Results are cached per
//! `(model, query)` in the store's `query_expansion_cache` table rather than
//! on disk, since the table already exists for exactly this purpose.

use std::time::Duration;

use chunking_store::Store;

const MAX_ALTERNATIVES: usize = 3;

pub struct ExpansionClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl ExpansionClient {
    pub fn new(base_url: String, model: String) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("building the Ollama HTTP client should never fail");
        Self { http, base_url, model }
    }

    /// Returns up to [`MAX_ALTERNATIVES`] alternative phrasings, or an empty
    /// vec if expansion fails for any reason — failure here only means the
    /// query proceeds with just the original text (spec §4.7 step 2 is
    /// additive, never required for a query to succeed).
    pub fn expand(&self, store: &Store, query: &str) -> Vec<String> {
        if let Ok(Some(cached)) = store.sqlite.get_cached_expansion(&self.model, query) {
            return cached;
        }

        match self.request_alternatives(query) {
            Ok(alternatives) => {
                if let Err(err) = store.sqlite.put_cached_expansion(&self.model, query, &alternatives) {
                    tracing::warn!(error = %err, "failed to cache query expansion");
                }
                alternatives
            }
            Err(err) => {
                tracing::warn!(error = %err, "query expansion request failed, continuing with original query only");
                Vec::new()
            }
        }
    }

    fn request_alternatives(&self, query: &str) -> anyhow::Result<Vec<String>> {
        let prompt = format!(
            "Rewrite the following search query as up to {MAX_ALTERNATIVES} alternative phrasings \
             that preserve its meaning. Reply with one phrasing per line and nothing else.\n\nQuery: {query}"
        );
        let body = serde_json::json!({ "model": self.model, "prompt": prompt, "stream": false });

        let response: serde_json::Value = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        let text = response.get("response").and_then(|v| v.as_str()).unwrap_or("");
        Ok(text
            .lines()
            .map(|line| line.trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == ' ').to_string())
            .filter(|line| !line.is_empty())
            .take(MAX_ALTERNATIVES)
            .collect())
    }
}
