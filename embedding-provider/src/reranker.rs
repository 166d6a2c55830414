use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;
use ort::{session::Session, value::Tensor, Error as OrtError};
use thiserror::Error;
use tokenizers::{EncodeInput, Tokenizer};

/// A single `(original_index, score)` pair, `score` higher is more relevant.
/// Callers zip this back onto their own candidate list by `index` rather
/// than the reranker owning candidate payload shapes (spec §6's "must
/// return input dicts augmented with rerank_score" becomes, in Rust, "give
/// the caller back the scores in candidate order").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RerankerError {
    #[error("invalid reranker configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

/// Cross-encoder reranker interface. Must tolerate up to a few hundred
/// candidates and must never reorder ties inconsistently run-to-run; a
/// failing reranker is a pass-through at the call site, not a hard error
/// for the whole query (spec §4.7 step 6).
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, documents: &[&str], top_k: usize) -> Result<Vec<RerankResult>, RerankerError>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct CrossEncoderConfig {
    pub model_path: PathBuf,
    pub runtime_library_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub max_input_length: usize,
    pub model_name: String,
}

/// ONNX cross-encoder: scores a `(query, document)` pair jointly through one
/// forward pass, unlike the bi-encoder `Embedder` which scores them
/// independently. Pairs are batched one at a time here (cross-encoders are
/// typically small enough that batch-of-one is fine for CPU inference; a
/// mini-batch version would pad to the longest pair in each batch the same
/// way `OnnxStdIoEmbedder::build_input_tensors` does).
pub struct CrossEncoderReranker {
    model_name: String,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_input_length: usize,
}

impl CrossEncoderReranker {
    pub fn new(config: CrossEncoderConfig) -> Result<Self, RerankerError> {
        if config.max_input_length == 0 {
            return Err(RerankerError::InvalidConfiguration { message: "max_input_length must be greater than zero".into() });
        }

        let model_path = resolve_existing_path(&config.model_path, "cross-encoder ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "cross-encoder tokenizer config")?;
        resolve_existing_path(&config.runtime_library_path, "ONNX Runtime shared library")?;

        ort::init_from(config.runtime_library_path.to_string_lossy().to_string())
            .with_name("hybrid-search-reranker")
            .commit()
            .map_err(|err| map_ort_error("initialize ONNX Runtime environment", err))?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load cross-encoder model", err))?;

        let tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|err| map_tokenizer_error("load tokenizer", err))?;

        Ok(Self { model_name: config.model_name, session: Mutex::new(session), tokenizer, max_input_length: config.max_input_length })
    }

    fn score_pair(&self, query: &str, document: &str) -> Result<f32, RerankerError> {
        let encoding = self
            .tokenizer
            .encode(EncodeInput::Dual(query.into(), document.into()), true)
            .map_err(|err| map_tokenizer_error("tokenize query/document pair", err))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        let type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

        let seq_len = ids.len().min(self.max_input_length);
        let ids = &ids[..seq_len];
        let mask = &mask[..seq_len];
        let type_ids = &type_ids[..seq_len];

        let input_ids = Tensor::from_array(Array2::from_shape_vec((1, seq_len), ids.to_vec()).unwrap())
            .map_err(|err| map_ort_error("prepare input_ids", err))?;
        let attention_mask = Tensor::from_array(Array2::from_shape_vec((1, seq_len), mask.to_vec()).unwrap())
            .map_err(|err| map_ort_error("prepare attention_mask", err))?;
        let token_type_ids = Tensor::from_array(Array2::from_shape_vec((1, seq_len), type_ids.to_vec()).unwrap())
            .map_err(|err| map_ort_error("prepare token_type_ids", err))?;

        let mut session = self.session.lock().expect("reranker session lock poisoned");
        let outputs = session
            .run(ort::inputs![input_ids, attention_mask, token_type_ids])
            .map_err(|err| map_ort_error("execute cross-encoder session", err))?;

        let output = &outputs[0];
        let (_, data) =
            output.try_extract_tensor::<f32>().map_err(|err| map_ort_error("extract relevance logit", err))?;

        data.first().copied().ok_or_else(|| RerankerError::ProviderFailure { message: "empty reranker output".into() })
    }
}

impl Reranker for CrossEncoderReranker {
    fn rerank(&self, query: &str, documents: &[&str], top_k: usize) -> Result<Vec<RerankResult>, RerankerError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        if documents.len() == 1 {
            let score = self.score_pair(query, documents[0])?;
            return Ok(vec![RerankResult { index: 0, score }]);
        }

        let mut scored: Vec<RerankResult> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| self.score_pair(query, doc).map(|score| RerankResult { index, score }))
            .collect::<Result<Vec<_>, _>>()?;

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, RerankerError> {
    fs::metadata(path)
        .map_err(|_| RerankerError::InvalidConfiguration { message: format!("{description} `{}` does not exist", path.display()) })?;
    path.canonicalize().map_err(|err| RerankerError::ProviderFailure {
        message: format!("failed to canonicalize {description} `{}`: {err}", path.display()),
    })
}

fn map_ort_error(context: &str, err: OrtError) -> RerankerError {
    RerankerError::ProviderFailure { message: format!("{context} failed: {err}") }
}

fn map_tokenizer_error(context: &str, err: tokenizers::Error) -> RerankerError {
    RerankerError::ProviderFailure { message: format!("{context} failed: {err}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerank_result_ordering_is_descending() {
        let mut results = vec![RerankResult { index: 0, score: 0.2 }, RerankResult { index: 1, score: 0.9 }];
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        assert_eq!(results[0].index, 1);
    }
}
