pub mod config;
pub mod embedder;
pub mod reranker;

pub use embedder::{Embedder, EmbedderError, EmbedderInfo, OnnxStdIoConfig, OnnxStdIoEmbedder, ProviderKind};
pub use reranker::{CrossEncoderConfig, CrossEncoderReranker, RerankResult, Reranker, RerankerError};
