use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use hybrid_service::search::QueryRequest;
use hybrid_service::state::AppState;
use hybrid_service::{routes, AppConfig};

#[derive(Parser)]
#[command(name = "hybrid-service", about = "Hybrid vector + lexical knowledge-base search service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and knowledge-base watcher (default when no subcommand is given).
    Serve,
    /// Enqueue a single file for indexing and wait for the pipeline to drain.
    Index {
        path: String,
        #[arg(long)]
        force: bool,
    },
    /// Run one query against the hybrid search executor and print the results as JSON.
    Query {
        text: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Rebuild a derived index from the durable SQLite rows (spec §4.8.6).
    Rebuild {
        #[command(subcommand)]
        target: RebuildTarget,
    },
}

#[derive(Subcommand)]
enum RebuildTarget {
    Hnsw,
    Fts,
}

fn init_tracing(log_dir: &std::path::Path) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "hybrid-service.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "hybrid_service=info,tower_http=info".into());

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true).with_line_number(true).compact();
    let file_layer = tracing_subscriber::fmt::layer().with_target(true).with_line_number(true).with_ansi(false).with_writer(non_blocking_writer).compact();

    tracing_subscriber::registry().with(env_filter).with(stdout_layer).with(file_layer).init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let _log_guard = init_tracing(&config.data_dir.join("logs"))?;

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(target: "hybrid_service::panic", "panicked: {info}");
        default_panic(info);
    }));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Index { path, force } => run_index(config, path, force).await,
        Command::Query { text, top_k } => run_query(config, text, top_k).await,
        Command::Rebuild { target } => run_rebuild(config, target).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    info!(listen_addr = %config.listen_addr, data_dir = ?config.data_dir, "hybrid-service starting");

    let addr: SocketAddr = config.listen_addr.parse().context("invalid PORT/listen address")?;
    let watch_enabled = config.watch_enabled;
    let watch_root = config.knowledge_base_path.clone();
    let watch_debounce = Duration::from_secs(config.watch_debounce_seconds);

    let state = tokio::task::spawn_blocking(move || AppState::bootstrap(config))
        .await
        .context("bootstrap task panicked")??;

    let app = routes::create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "hybrid-service listening");

    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if !watch_enabled {
            info!("knowledge-base watcher disabled via WATCH_ENABLED");
            return;
        }
        match hybrid_service::watcher::KnowledgeBaseWatcher::start(watch_root.clone(), watch_debounce, coordinator) {
            Ok(watcher) => {
                info!(root = ?watch_root, "knowledge-base watcher started");
                // Keep the watcher alive for the lifetime of the server task.
                std::future::pending::<()>().await;
                drop(watcher);
            }
            Err(err) => error!(error = %err, "failed to start knowledge-base watcher"),
        }
    });

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let shutdown_coordinator = state.coordinator.clone();
    let shutdown_store = state.store.clone();
    let _ = tokio::task::spawn_blocking(move || {
        shutdown_coordinator.stop(Duration::from_secs(10));
        if let Err(err) = shutdown_store.persist() {
            error!(error = %err, "failed to persist vector index on shutdown");
        }
    })
    .await;

    info!("hybrid-service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_index(config: AppConfig, path: String, force: bool) -> Result<()> {
    let state = tokio::task::spawn_blocking(move || AppState::bootstrap(config)).await.context("bootstrap task panicked")??;

    let coordinator = state.coordinator.clone();
    let path_for_enqueue = path.clone();
    let enqueued = tokio::task::spawn_blocking(move || coordinator.add_file(&path_for_enqueue, chunk_model::Priority::Normal, force))
        .await
        .context("enqueue task panicked")??;

    if !enqueued {
        println!("{path}: already indexed, nothing to do (use --force to reindex)");
        return Ok(());
    }

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let queue = state.queue.clone();
        let pending = tokio::task::spawn_blocking(move || queue.size() + queue.in_flight_count()).await?;
        if pending == 0 {
            break;
        }
    }

    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.persist()).await?.context("failed to persist vector index")?;

    println!("{path}: indexed");
    Ok(())
}

async fn run_query(config: AppConfig, text: String, top_k: usize) -> Result<()> {
    let state = tokio::task::spawn_blocking(move || AppState::bootstrap(config)).await.context("bootstrap task panicked")??;

    let executor = state.executor.clone();
    let response = tokio::task::spawn_blocking(move || {
        executor.query(&QueryRequest { query: text, top_k, threshold: None, use_hybrid: true })
    })
    .await
    .context("query task panicked")?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_rebuild(config: AppConfig, target: RebuildTarget) -> Result<()> {
    let state = tokio::task::spawn_blocking(move || AppState::bootstrap(config)).await.context("bootstrap task panicked")??;

    let store = state.store.clone();
    let count = match target {
        RebuildTarget::Hnsw => tokio::task::spawn_blocking(move || store.rebuild_vector_index()).await?,
        RebuildTarget::Fts => tokio::task::spawn_blocking(move || store.rebuild_lexical_index()).await?,
    }?;

    println!("rebuilt {count} entries");
    Ok(())
}
