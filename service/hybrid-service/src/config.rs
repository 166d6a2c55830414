//! Every environment key enumerated in spec §6, each with a default so the
//! service runs out of the box against a throwaway data directory.

use std::path::PathBuf;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Hybrid,
    Semantic,
    Fixed,
}

impl ChunkStrategy {
    fn from_env(raw: &str) -> Self {
        match raw {
            "semantic" => ChunkStrategy::Semantic,
            "fixed" => ChunkStrategy::Fixed,
            _ => ChunkStrategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub knowledge_base_path: PathBuf,
    pub data_dir: PathBuf,
    pub model_name: String,
    pub embedding_dimension: usize,
    /// Overrides for the ONNX embedder's on-disk assets. `None` falls back
    /// to `embedding_provider::config::default_stdio_config`'s bundled
    /// defaults — not part of spec §6's enumerated table, but needed to
    /// point the embedder at a model outside the crate's own directory.
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
    pub onnx_runtime_path: Option<PathBuf>,
    pub chunk_strategy: ChunkStrategy,
    pub chunk_max_tokens: usize,
    pub embedding_batch_size: usize,
    pub embedding_workers: usize,
    pub max_pending_embeddings: usize,
    pub reranking_enabled: bool,
    pub reranking_model: String,
    pub reranking_top_n: usize,
    pub reranking_model_path: Option<PathBuf>,
    pub reranking_tokenizer_path: Option<PathBuf>,
    pub cache_enabled: bool,
    pub cache_max_size: usize,
    pub query_expansion_enabled: bool,
    pub query_expansion_model: String,
    pub ollama_url: String,
    pub watch_enabled: bool,
    pub watch_debounce_seconds: u64,
    pub watch_batch_size: usize,
    pub auto_self_heal: bool,
    pub auto_repair_orphans: bool,
    pub check_hnsw_health: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let embedding_workers = env_usize("EMBEDDING_WORKERS", 2);
        Self {
            listen_addr: format!("127.0.0.1:{}", env_string("PORT", "8420")),
            knowledge_base_path: PathBuf::from(env_string("KNOWLEDGE_BASE_PATH", "./knowledge-base")),
            data_dir: PathBuf::from(env_string("DATA_DIR", "./data")),
            model_name: env_string("MODEL_NAME", "ruri-v3-onnx"),
            embedding_dimension: env_usize("EMBEDDING_DIMENSION", 768),
            model_path: std::env::var("MODEL_PATH").ok().map(PathBuf::from),
            tokenizer_path: std::env::var("TOKENIZER_PATH").ok().map(PathBuf::from),
            onnx_runtime_path: std::env::var("ONNX_RUNTIME_PATH").ok().map(PathBuf::from),
            chunk_strategy: ChunkStrategy::from_env(&env_string("CHUNK_STRATEGY", "hybrid")),
            chunk_max_tokens: env_usize("CHUNK_MAX_TOKENS", 512),
            embedding_batch_size: env_usize("EMBEDDING_BATCH_SIZE", 32),
            embedding_workers,
            max_pending_embeddings: env_usize("MAX_PENDING_EMBEDDINGS", embedding_workers * 2),
            reranking_enabled: env_bool("RERANKING_ENABLED", false),
            reranking_model: env_string("RERANKING_MODEL", "cross-encoder-onnx"),
            reranking_top_n: env_usize("RERANKING_TOP_N", 20),
            reranking_model_path: std::env::var("RERANKING_MODEL_PATH").ok().map(PathBuf::from),
            reranking_tokenizer_path: std::env::var("RERANKING_TOKENIZER_PATH").ok().map(PathBuf::from),
            cache_enabled: env_bool("CACHE_ENABLED", true),
            cache_max_size: env_usize("CACHE_MAX_SIZE", 100),
            query_expansion_enabled: env_bool("QUERY_EXPANSION_ENABLED", false),
            query_expansion_model: env_string("QUERY_EXPANSION_MODEL", "llama3"),
            ollama_url: env_string("OLLAMA_URL", "http://127.0.0.1:11434"),
            watch_enabled: env_bool("WATCH_ENABLED", true),
            watch_debounce_seconds: env_u64("WATCH_DEBOUNCE_SECONDS", 2),
            watch_batch_size: env_usize("WATCH_BATCH_SIZE", 50),
            auto_self_heal: env_bool("AUTO_SELF_HEAL", true),
            auto_repair_orphans: env_bool("AUTO_REPAIR_ORPHANS", true),
            check_hnsw_health: env_bool("CHECK_HNSW_HEALTH", true),
        }
    }
}
