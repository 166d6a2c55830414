//! Pipeline Coordinator (C6): Chunk -> Embed -> Store, composed from bounded
//! channels and a worker pool at the embed stage (the bottleneck).
//!
//! Each stage is its own pool of `std::thread`s. The chunk->embed channel's
//! capacity *is* the "semaphore of max_pending embeddings" spec §4.6
//! describes: a bounded `mpsc::sync_channel` blocks its producer once full,
//! which is exactly what a counting semaphore would do here, so no separate
//! semaphore type is introduced.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chunk_model::{ChunkedDoc, EmbeddedDoc, Priority, QueueItem};
use chunking_store::Store;
use embedding_provider::Embedder;

use crate::hash::hash_file;
use crate::queue::IndexingQueue;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] chunking_store::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_workers: usize,
    pub embed_workers: usize,
    pub embedding_batch_size: usize,
    pub max_pending_embeddings: usize,
    pub dequeue_timeout: Duration,
    pub skip_log_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let embed_workers = 2;
        Self {
            chunk_workers: 1,
            embed_workers,
            embedding_batch_size: 32,
            max_pending_embeddings: embed_workers * 2,
            dequeue_timeout: Duration::from_millis(250),
            skip_log_interval: Duration::from_secs(10),
        }
    }
}

struct SkipCounter {
    count: AtomicU64,
    last_logged_at: Mutex<Instant>,
    interval: Duration,
}

impl SkipCounter {
    fn new(interval: Duration) -> Self {
        Self { count: AtomicU64::new(0), last_logged_at: Mutex::new(Instant::now()), interval }
    }

    /// Records a pre-stage skip and, at most once per `interval`, emits one
    /// summary log line instead of one line per file (spec §4.6).
    fn record(&self) {
        let total = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut last = self.last_logged_at.lock().expect("skip counter lock poisoned");
        if last.elapsed() >= self.interval {
            tracing::info!(skipped_since_last_log = total, "pre-stage skip: already indexed at current hash");
            self.count.store(0, Ordering::Relaxed);
            *last = Instant::now();
        }
    }
}

/// Drives the three stages. Construct once, call `start`, then `add_file`
/// freely from any thread (watcher, HTTP handlers, self-heal).
pub struct PipelineCoordinator {
    queue: Arc<IndexingQueue>,
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    config: PipelineConfig,
    cancel: Arc<AtomicBool>,
    skip_counter: Arc<SkipCounter>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineCoordinator {
    pub fn new(store: Arc<Store>, queue: Arc<IndexingQueue>, embedder: Arc<dyn Embedder>, config: PipelineConfig) -> Self {
        let skip_counter = Arc::new(SkipCounter::new(config.skip_log_interval));
        Self { queue, store, embedder, config, cancel: Arc::new(AtomicBool::new(false)), skip_counter, handles: Mutex::new(Vec::new()) }
    }

    /// Pre-stage skip check (spec §4.6) plus ledger `start_processing`, then
    /// admission into C5. Returns `Ok(false)` without enqueuing when the
    /// path is skipped (already indexed at the current hash) or already
    /// queued/in-flight.
    pub fn add_file(&self, path: &str, priority: Priority, force: bool) -> Result<bool, PipelineError> {
        let hash = hash_file(Path::new(path))?;
        if !force && self.store.is_document_indexed(path, &hash)? {
            self.skip_counter.record();
            return Ok(false);
        }
        self.store.sqlite.start_processing(path, &hash)?;
        Ok(self.queue.add(path, priority, force))
    }

    /// Spawns the chunk, embed and store worker pools. Idempotent only in
    /// the sense that calling it twice spawns a second set of workers;
    /// callers should call it once per coordinator instance.
    pub fn start(self: &Arc<Self>) {
        let (chunk_tx, embed_rx_source) = sync_channel::<ChunkedDoc>(self.config.max_pending_embeddings);
        let embed_rx = Arc::new(Mutex::new(embed_rx_source));
        let (store_tx, store_rx) = sync_channel::<EmbeddedDoc>(self.config.embed_workers.max(1) * 2);
        let store_rx = Arc::new(Mutex::new(store_rx));

        let mut handles = self.handles.lock().expect("handles lock poisoned");

        for _ in 0..self.config.chunk_workers.max(1) {
            let this = Arc::clone(self);
            let tx = chunk_tx.clone();
            handles.push(std::thread::spawn(move || this.run_chunk_worker(tx)));
        }
        drop(chunk_tx);

        for _ in 0..self.config.embed_workers.max(1) {
            let this = Arc::clone(self);
            let rx = Arc::clone(&embed_rx);
            let tx = store_tx.clone();
            handles.push(std::thread::spawn(move || this.run_embed_worker(rx, tx)));
        }
        drop(store_tx);

        {
            let this = Arc::clone(self);
            let rx = Arc::clone(&store_rx);
            handles.push(std::thread::spawn(move || this.run_store_worker(rx)));
        }
    }

    /// Signals cancellation and joins every worker, waiting up to `grace`.
    /// Items mid-flight are discarded without writing to the store; their
    /// ledger records stay `in_progress` and are retried on next startup
    /// (spec §4.6 "Cancellation / shutdown").
    pub fn stop(&self, grace: Duration) {
        self.cancel.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + grace;
        let mut handles = self.handles.lock().expect("handles lock poisoned");
        for handle in handles.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Detach: the thread will observe `cancel` and exit on its
                // own; we just stop waiting for it.
                drop(handle);
                continue;
            }
            let _ = handle.join();
        }
    }

    fn run_chunk_worker(&self, out: SyncSender<ChunkedDoc>) {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return;
            }
            let Some(item) = self.queue.get(self.config.dequeue_timeout) else { continue };
            self.process_chunk_item(item, &out);
        }
    }

    fn process_chunk_item(&self, item: QueueItem, out: &SyncSender<ChunkedDoc>) {
        let path = item.path.clone();
        let outcome = self.chunk_one(&item);
        match outcome {
            ChunkOutcome::Chunked(doc) => {
                // May block: this is the backpressure point (spec §5).
                if out.send(doc).is_err() {
                    tracing::warn!(file_path = %path, "embed stage channel closed, dropping chunked document");
                }
            }
            ChunkOutcome::EmptyDocument => {
                self.queue.mark_complete(&path);
            }
            ChunkOutcome::Skip(reason) => {
                tracing::info!(file_path = %path, reason, "chunk stage skip");
                self.queue.mark_complete(&path);
            }
            ChunkOutcome::Fail(reason) => {
                if let Err(e) = self.store.sqlite.mark_rejected(&path, &reason) {
                    tracing::error!(file_path = %path, error = %e, "failed to record rejection");
                }
                self.queue.mark_complete(&path);
            }
        }
    }

    fn chunk_one(&self, item: &QueueItem) -> ChunkOutcome {
        if !Path::new(&item.path).exists() {
            return ChunkOutcome::Fail("file no longer exists".to_string());
        }
        let hash = match hash_file(Path::new(&item.path)) {
            Ok(h) => h,
            Err(e) => return ChunkOutcome::Fail(format!("failed to hash file: {e}")),
        };
        if !item.force {
            match self.store.is_document_indexed(&item.path, &hash) {
                Ok(true) => return ChunkOutcome::Skip("already indexed at current hash (race)".to_string()),
                Ok(false) => {}
                Err(e) => return ChunkOutcome::Fail(format!("store error during skip re-check: {e}")),
            }
        }

        let path_for_extract = item.path.clone();
        let extraction = std::panic::catch_unwind(move || file_chunker::chunk_file_with_file_record(&path_for_extract));
        let output = match extraction {
            Ok(output) => output,
            Err(_) => return ChunkOutcome::Fail("extractor panicked".to_string()),
        };

        if output.chunks.is_empty() {
            let method = output.file.reader_backend.as_deref().unwrap_or("unknown");
            if item.force {
                if let Err(e) = self.store.delete_document(&item.path) {
                    return ChunkOutcome::Fail(format!("failed to delete existing document before force reindex: {e}"));
                }
            }
            match self.store.add_document(&item.path, &hash, method, &[], &[]) {
                Ok(_) => {
                    if let Err(e) = self.store.sqlite.mark_completed(&item.path, 0) {
                        tracing::error!(file_path = %item.path, error = %e, "failed to mark empty document completed");
                    }
                    ChunkOutcome::EmptyDocument
                }
                Err(chunking_store::StoreError::DuplicatePath(_)) => ChunkOutcome::Skip("already indexed (race)".to_string()),
                Err(e) => ChunkOutcome::Fail(format!("failed to persist empty document: {e}")),
            }
        } else {
            ChunkOutcome::Chunked(ChunkedDoc { queue_item: item.clone(), file_hash: hash, file: output.file, chunks: output.chunks })
        }
    }

    fn run_embed_worker(&self, rx: Arc<Mutex<Receiver<ChunkedDoc>>>, out: SyncSender<EmbeddedDoc>) {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return;
            }
            let doc = {
                let rx = rx.lock().expect("embed rx lock poisoned");
                match rx.recv_timeout(self.config.dequeue_timeout) {
                    Ok(doc) => doc,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            };
            self.process_embed_item(doc, &out);
        }
    }

    fn process_embed_item(&self, doc: ChunkedDoc, out: &SyncSender<EmbeddedDoc>) {
        let path = doc.queue_item.path.clone();
        match self.embed_all(&doc.chunks) {
            Ok(embeddings) => {
                let embedded = EmbeddedDoc { queue_item: doc.queue_item, file_hash: doc.file_hash, file: doc.file, chunks: doc.chunks, embeddings };
                if out.send(embedded).is_err() {
                    tracing::warn!(file_path = %path, "store stage channel closed, dropping embedded document");
                }
            }
            Err(e) => {
                tracing::warn!(file_path = %path, error = %e, "embedding provider failed, rejecting document");
                if let Err(e) = self.store.sqlite.mark_rejected(&path, &format!("embedding failed: {e}")) {
                    tracing::error!(file_path = %path, error = %e, "failed to record rejection");
                }
                self.queue.mark_complete(&path);
            }
        }
    }

    /// Embeds in mini-batches of `embedding_batch_size` over one document's
    /// chunks (spec §4.6).
    fn embed_all(&self, chunks: &[chunk_model::ChunkRecord]) -> Result<Vec<Vec<f32>>, embedding_provider::EmbedderError> {
        let mut out = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embedding_batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn run_store_worker(&self, rx: Arc<Mutex<Receiver<EmbeddedDoc>>>) {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return;
            }
            let doc = {
                let rx = rx.lock().expect("store rx lock poisoned");
                match rx.recv_timeout(self.config.dequeue_timeout) {
                    Ok(doc) => doc,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            };
            self.process_store_item(doc);
        }
    }

    fn process_store_item(&self, doc: EmbeddedDoc) {
        let path = doc.queue_item.path.clone();
        let method = doc.file.reader_backend.clone().unwrap_or_else(|| "unknown".to_string());

        // Force reindex replaces the document outright (spec §8 "delete-then-
        // reindex"): the old row (and its chunk/vector/fts rows) must be gone
        // before the new write, or `add_document` fails with `DuplicatePath`
        // since the path is still indexed under the old hash.
        if doc.queue_item.force {
            if let Err(e) = self.store.delete_document(&path) {
                tracing::error!(file_path = %path, error = %e, "failed to delete existing document before force reindex");
            }
        }

        // Store write failure is treated as transient and retried once
        // inline (spec §7); a second failure leaves the ledger
        // `in_progress` for next-boot resume rather than marking rejected.
        let mut attempt = self.store.add_document(&path, &doc.file_hash, &method, &doc.chunks, &doc.embeddings);
        if attempt.is_err() {
            tracing::warn!(file_path = %path, "store write failed, retrying once");
            attempt = self.store.add_document(&path, &doc.file_hash, &method, &doc.chunks, &doc.embeddings);
        }

        match attempt {
            Ok(_) => {
                if let Err(e) = self.store.sqlite.mark_completed(&path, doc.chunks.len() as u32) {
                    tracing::error!(file_path = %path, error = %e, "failed to mark document completed");
                }
            }
            Err(e) => {
                tracing::error!(file_path = %path, error = %e, "store write failed twice, leaving in_progress for next-boot resume");
            }
        }
        self.queue.mark_complete(&path);
    }
}

enum ChunkOutcome {
    Chunked(ChunkedDoc),
    EmptyDocument,
    Skip(String),
    Fail(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::Priority;
    use chunking_store::Store;
    use embedding_provider::{Embedder, EmbedderError, EmbedderInfo, ProviderKind};
    use std::io::Write;
    use tempfile::tempdir;

    struct FakeEmbedder {
        info: EmbedderInfo,
    }

    impl FakeEmbedder {
        fn new(dim: usize) -> Self {
            Self { info: EmbedderInfo { provider: ProviderKind::OnnxStdIo, embedding_model_id: "fake".into(), dimension: dim, text_repr_version: "v1".into() } }
        }
    }

    impl Embedder for FakeEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(self.embed_batch(&[text])?.remove(0))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.info.dimension];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % self.info.dimension] += b as f32;
                    }
                    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
                    v.iter_mut().for_each(|x| *x /= norm);
                    v
                })
                .collect())
        }

        fn info(&self) -> &EmbedderInfo {
            &self.info
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn end_to_end_index_then_query_is_findable() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "a.txt", "the quick brown fox");

        let store = Arc::new(Store::open_in_memory(8).unwrap());
        let queue = Arc::new(IndexingQueue::new());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(8));
        let coordinator = Arc::new(PipelineCoordinator::new(store.clone(), queue.clone(), embedder, PipelineConfig::default()));
        coordinator.start();

        assert!(coordinator.add_file(&path, Priority::Normal, false).unwrap());

        let info = wait_for_document(&store, &path, Duration::from_secs(5));
        assert_eq!(info.chunk_count, 1);

        let hits = store.lexical.search("fox", 5).unwrap();
        assert_eq!(hits.len(), 1);

        coordinator.stop(Duration::from_secs(1));
    }

    #[test]
    fn pre_stage_skip_prevents_reindex_of_unchanged_file() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "a.txt", "the quick brown fox");

        let store = Arc::new(Store::open_in_memory(8).unwrap());
        let queue = Arc::new(IndexingQueue::new());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(8));
        let coordinator = Arc::new(PipelineCoordinator::new(store.clone(), queue.clone(), embedder, PipelineConfig::default()));
        coordinator.start();

        assert!(coordinator.add_file(&path, Priority::Normal, false).unwrap());
        let info_before = wait_for_document(&store, &path, Duration::from_secs(5));

        assert!(!coordinator.add_file(&path, Priority::Normal, false).unwrap(), "unchanged file should be skipped");
        std::thread::sleep(Duration::from_millis(200));
        let info_after = store.sqlite.get_document_info(&path).unwrap().unwrap();
        assert_eq!(info_before.chunk_count, info_after.chunk_count);

        coordinator.stop(Duration::from_secs(1));
    }

    #[test]
    fn force_reindex_replaces_existing_document_instead_of_erroring() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "a.txt", "the quick brown fox");

        let store = Arc::new(Store::open_in_memory(8).unwrap());
        let queue = Arc::new(IndexingQueue::new());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(8));
        let coordinator = Arc::new(PipelineCoordinator::new(store.clone(), queue.clone(), embedder, PipelineConfig::default()));
        coordinator.start();

        assert!(coordinator.add_file(&path, Priority::Normal, false).unwrap());
        wait_for_document(&store, &path, Duration::from_secs(5));

        // Rewrite with different content so the hash changes, then force a
        // reindex while the old row is still present under the old hash.
        std::fs::write(&path, "a completely different sentence about dogs").unwrap();
        assert!(coordinator.add_file(&path, Priority::High, true).unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let hits = store.lexical.search("dogs", 5).unwrap();
            if !hits.is_empty() {
                break;
            }
            assert!(Instant::now() < deadline, "timed out waiting for forced reindex to land");
            std::thread::sleep(Duration::from_millis(20));
        }

        let info = store.sqlite.get_document_info(&path).unwrap().unwrap();
        assert_eq!(info.chunk_count, 1);
        let progress = store.sqlite.get_progress(&path).unwrap().unwrap();
        assert_eq!(progress.status, chunk_model::ProgressStatus::Completed);
        assert!(store.lexical.search("fox", 5).unwrap().is_empty(), "old content should no longer be searchable");

        coordinator.stop(Duration::from_secs(1));
    }

    fn wait_for_document(store: &Store, path: &str, timeout: Duration) -> chunking_store::DocumentInfo {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(info) = store.sqlite.get_document_info(path).unwrap() {
                return info;
            }
            assert!(Instant::now() < deadline, "timed out waiting for document to be stored");
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
