//! HTTP surface (spec §6): thin handlers over `AppState`. Handlers that
//! touch the Store or the pipeline run on `spawn_blocking` since both are
//! synchronous (spec §5 — only the HTTP layer itself is async).

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chunk_model::Priority;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::integrity::{self, IntegrityReport};
use crate::search::{QueryRequest, QueryResponse};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/documents", get(list_documents))
        .route("/documents/integrity", get(documents_integrity))
        .route("/document/{*path}", get(get_document).post(upsert_document).delete(delete_document))
        .route("/document/{*path}/reindex", post(reindex_document))
        .route("/queue/jobs", get(queue_jobs))
        .route("/indexing/pause", post(pause_indexing))
        .route("/indexing/resume", post(resume_indexing))
        .route("/indexing/clear", post(clear_indexing))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    queue_size: usize,
    in_flight: usize,
    paused: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queue_size: state.queue.size(),
        in_flight: state.queue.in_flight_count(),
        paused: state.queue.is_paused(),
    })
}

async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> AppResult<Json<QueryResponse>> {
    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".into()));
    }
    let executor = state.executor.clone();
    let response = tokio::task::spawn_blocking(move || executor.query(&req))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct DocumentSummary {
    file_path: String,
    file_hash: String,
    indexed_at: String,
    extraction_method: Option<String>,
    chunk_count: u32,
}

async fn list_documents(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<DocumentSummary>>> {
    let store = state.store.clone();
    let documents = tokio::task::spawn_blocking(move || store.sqlite.query_documents_with_chunks())
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;
    Ok(Json(
        documents
            .into_iter()
            .map(|d| DocumentSummary {
                file_path: d.file_path,
                file_hash: d.file_hash,
                indexed_at: d.indexed_at,
                extraction_method: d.extraction_method,
                chunk_count: d.chunk_count,
            })
            .collect(),
    ))
}

async fn documents_integrity(State(state): State<Arc<AppState>>) -> AppResult<Json<IntegrityReport>> {
    let store = state.store.clone();
    let report = tokio::task::spawn_blocking(move || integrity::compute(&store))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;
    Ok(Json(report))
}

async fn get_document(State(state): State<Arc<AppState>>, AxumPath(path): AxumPath<String>) -> AppResult<Json<DocumentSummary>> {
    let store = state.store.clone();
    let path_clone = path.clone();
    let info = tokio::task::spawn_blocking(move || store.sqlite.get_document_info(&path_clone))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;
    let info = info.ok_or_else(|| AppError::DocumentNotFound(path))?;
    Ok(Json(DocumentSummary {
        file_path: info.file_path,
        file_hash: info.file_hash,
        indexed_at: info.indexed_at,
        extraction_method: info.extraction_method,
        chunk_count: info.chunk_count,
    }))
}

#[derive(Debug, Deserialize)]
struct EnqueueQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    enqueued: bool,
}

async fn upsert_document(
    State(state): State<Arc<AppState>>,
    AxumPath(path): AxumPath<String>,
    Query(q): Query<EnqueueQuery>,
) -> AppResult<Json<EnqueueResponse>> {
    let coordinator = state.coordinator.clone();
    let enqueued = tokio::task::spawn_blocking(move || coordinator.add_file(&path, Priority::Normal, q.force))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;
    Ok(Json(EnqueueResponse { enqueued }))
}

async fn reindex_document(State(state): State<Arc<AppState>>, AxumPath(path): AxumPath<String>) -> AppResult<Json<EnqueueResponse>> {
    let coordinator = state.coordinator.clone();
    let enqueued = tokio::task::spawn_blocking(move || coordinator.add_file(&path, Priority::High, true))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;
    Ok(Json(EnqueueResponse { enqueued }))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    found: bool,
    chunks_deleted: u32,
}

async fn delete_document(State(state): State<Arc<AppState>>, AxumPath(path): AxumPath<String>) -> AppResult<Json<DeleteResponse>> {
    let store = state.store.clone();
    let path_clone = path.clone();
    let outcome = tokio::task::spawn_blocking(move || store.delete_document(&path_clone))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))??;
    if !outcome.found {
        return Err(AppError::DocumentNotFound(path));
    }
    Ok(Json(DeleteResponse { found: outcome.found, chunks_deleted: outcome.chunks_deleted }))
}

#[derive(Debug, Serialize)]
struct QueueJobsResponse {
    size: usize,
    in_flight: usize,
    paused: bool,
}

async fn queue_jobs(State(state): State<Arc<AppState>>) -> Json<QueueJobsResponse> {
    Json(QueueJobsResponse {
        size: state.queue.size(),
        in_flight: state.queue.in_flight_count(),
        paused: state.queue.is_paused(),
    })
}

async fn pause_indexing(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.queue.pause();
    Json(serde_json::json!({ "paused": true }))
}

async fn resume_indexing(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.queue.resume();
    Json(serde_json::json!({ "paused": false }))
}

async fn clear_indexing(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cleared = state.queue.clear();
    Json(serde_json::json!({ "cleared": cleared }))
}
