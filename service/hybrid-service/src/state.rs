use std::sync::Arc;

use chunking_store::Store;
use embedding_provider::{CrossEncoderConfig, CrossEncoderReranker, Embedder, OnnxStdIoEmbedder, Reranker};
use indexing_pipeline::{self_heal, IndexingQueue, PipelineConfig, PipelineCoordinator, SelfHealConfig, SelfHealOptions};

use crate::cache::QueryCache;
use crate::config::AppConfig;
use crate::expansion::ExpansionClient;
use crate::search::HybridSearchExecutor;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub queue: Arc<IndexingQueue>,
    pub coordinator: Arc<PipelineCoordinator>,
    pub executor: Arc<HybridSearchExecutor>,
}

impl AppState {
    pub fn bootstrap(config: AppConfig) -> anyhow::Result<Self> {
        self_heal::validate_config(&SelfHealConfig {
            data_dir: config.data_dir.clone(),
            watch_root: config.watch_enabled.then(|| config.knowledge_base_path.clone()),
            embedding_dimension: config.embedding_dimension,
        })?;

        let store = Arc::new(Store::open(&config.data_dir, config.embedding_dimension)?);
        let queue = Arc::new(IndexingQueue::new());

        if config.auto_self_heal {
            let options = SelfHealOptions {
                auto_repair_orphans: config.auto_repair_orphans,
                check_hnsw_health: config.check_hnsw_health,
            };
            let report = self_heal::run_startup_self_heal(&store, &queue, options)?;
            tracing::info!(?report, "startup self-heal finished");
        }

        let embedder: Arc<dyn Embedder> = Arc::new(build_embedder(&config)?);

        let pipeline_config = PipelineConfig {
            embed_workers: config.embedding_workers.max(1),
            embedding_batch_size: config.embedding_batch_size.max(1),
            max_pending_embeddings: config.max_pending_embeddings.max(1),
            ..Default::default()
        };
        let coordinator = Arc::new(PipelineCoordinator::new(store.clone(), queue.clone(), embedder.clone(), pipeline_config));
        coordinator.start();

        let reranker: Option<Arc<dyn Reranker>> =
            if config.reranking_enabled { Some(Arc::new(build_reranker(&config)?)) } else { None };

        let expansion = config
            .query_expansion_enabled
            .then(|| Arc::new(ExpansionClient::new(config.ollama_url.clone(), config.query_expansion_model.clone())));

        let cache =
            if config.cache_enabled { QueryCache::new(config.cache_max_size) } else { QueryCache::disabled() };

        let executor = Arc::new(HybridSearchExecutor::new(
            store.clone(),
            embedder,
            reranker,
            config.reranking_top_n,
            expansion,
            cache,
        ));

        Ok(Self { config, store, queue, coordinator, executor })
    }
}

fn build_embedder(config: &AppConfig) -> anyhow::Result<OnnxStdIoEmbedder> {
    let mut onnx_config = embedding_provider::config::default_stdio_config();
    onnx_config.dimension = config.embedding_dimension;
    onnx_config.embedding_model_id = config.model_name.clone();
    if let Some(path) = &config.model_path {
        onnx_config.model_path = path.clone();
    }
    if let Some(path) = &config.tokenizer_path {
        onnx_config.tokenizer_path = path.clone();
    }
    if let Some(path) = &config.onnx_runtime_path {
        onnx_config.runtime_library_path = path.clone();
    }
    Ok(OnnxStdIoEmbedder::new(onnx_config)?)
}

fn build_reranker(config: &AppConfig) -> anyhow::Result<CrossEncoderReranker> {
    let model_path = config
        .reranking_model_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("RERANKING_ENABLED is set but RERANKING_MODEL_PATH is not"))?;
    let tokenizer_path = config
        .reranking_tokenizer_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("RERANKING_ENABLED is set but RERANKING_TOKENIZER_PATH is not"))?;
    let runtime_library_path =
        config.onnx_runtime_path.clone().ok_or_else(|| anyhow::anyhow!("RERANKING_ENABLED requires ONNX_RUNTIME_PATH"))?;

    Ok(CrossEncoderReranker::new(CrossEncoderConfig {
        model_path,
        runtime_library_path,
        tokenizer_path,
        max_input_length: 512,
        model_name: config.reranking_model.clone(),
    })?)
}
