//! Startup/Self-Heal (C8): runs once before the pipeline and HTTP server
//! start accepting new work. Config validation is fatal; everything else is
//! best-effort repair, logged and reported but never blocking startup.

use std::path::Path;

use anyhow::{bail, Context};
use chunk_model::{Priority, ProgressStatus};
use chunking_store::Store;

use crate::hash::hash_file;
use crate::queue::IndexingQueue;

/// Config knobs self-heal needs to validate before anything else runs.
#[derive(Debug, Clone)]
pub struct SelfHealConfig {
    pub data_dir: std::path::PathBuf,
    pub watch_root: Option<std::path::PathBuf>,
    pub embedding_dimension: usize,
}

/// Toggles for the two startup steps spec §6 exposes as independent env
/// knobs (`AUTO_REPAIR_ORPHANS`, `CHECK_HNSW_HEALTH`). Resume and the empty
/// document sweep are not gated — they repair crash-inconsistent state that
/// would otherwise wedge the ledger, not optional maintenance.
#[derive(Debug, Clone, Copy)]
pub struct SelfHealOptions {
    pub auto_repair_orphans: bool,
    pub check_hnsw_health: bool,
}

impl Default for SelfHealOptions {
    fn default() -> Self {
        Self { auto_repair_orphans: true, check_hnsw_health: true }
    }
}

/// One line per problem, aggregated so the operator sees everything wrong
/// at once instead of fixing one config error per restart.
pub fn validate_config(config: &SelfHealConfig) -> anyhow::Result<()> {
    let mut problems = Vec::new();

    if config.embedding_dimension == 0 {
        problems.push("embedding dimension must be non-zero".to_string());
    }
    if let Some(root) = &config.watch_root {
        if !root.exists() {
            problems.push(format!("watch root does not exist: {}", root.display()));
        } else if !root.is_dir() {
            problems.push(format!("watch root is not a directory: {}", root.display()));
        }
    }
    if config.data_dir.exists() && !config.data_dir.is_dir() {
        problems.push(format!("data dir exists but is not a directory: {}", config.data_dir.display()));
    }
    if let Some(parent) = config.data_dir.parent() {
        if !parent.exists() {
            problems.push(format!("data dir's parent does not exist: {}", parent.display()));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        bail!("invalid configuration:\n  - {}", problems.join("\n  - "))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SelfHealReport {
    pub resumed: usize,
    pub missing_at_resume: usize,
    pub orphans_repaired: usize,
    pub empty_documents_swept: usize,
    pub orphan_vector_count: u32,
    pub orphan_repair_skipped: bool,
    pub hnsw_health_check_skipped: bool,
}

/// Re-enqueues every `in_progress` ledger record: if the file is still on
/// disk it is retried at `Normal` priority; if it vanished while the
/// process was down it is marked `Rejected` (spec §4.8.1).
pub fn resume_in_progress(store: &Store, queue: &IndexingQueue) -> anyhow::Result<(usize, usize)> {
    let mut resumed = 0;
    let mut missing = 0;
    for record in store.sqlite.progress_by_status(ProgressStatus::InProgress).context("loading in-progress ledger records")? {
        if Path::new(&record.file_path).exists() {
            queue.add(record.file_path, Priority::Normal, false);
            resumed += 1;
        } else {
            store
                .sqlite
                .mark_rejected(&record.file_path, "file missing at startup resume")
                .with_context(|| format!("marking missing file rejected: {}", record.file_path))?;
            missing += 1;
        }
    }
    Ok((resumed, missing))
}

/// A ledger record says `Completed` but no Document row exists for it (the
/// process died between the ledger write and the atomic store write, or
/// between the two halves of a crash-inconsistent shutdown). Re-enqueues at
/// `High` priority, forced, since the ledger's claim cannot be trusted
/// without re-extracting (spec §4.8.2).
pub fn repair_orphan_progress_records(store: &Store, queue: &IndexingQueue) -> anyhow::Result<usize> {
    let mut repaired = 0;
    for record in store.sqlite.progress_by_status(ProgressStatus::Completed).context("loading completed ledger records")? {
        let has_document = store.sqlite.get_document_info(&record.file_path).context("checking document existence")?.is_some();
        if has_document {
            continue;
        }
        if !Path::new(&record.file_path).exists() {
            store
                .sqlite
                .mark_rejected(&record.file_path, "orphan progress record, file no longer exists")
                .with_context(|| format!("marking orphan rejected: {}", record.file_path))?;
            continue;
        }
        let hash = hash_file(Path::new(&record.file_path)).unwrap_or(record.file_hash);
        store.sqlite.start_processing(&record.file_path, &hash).context("resetting orphan ledger record")?;
        queue.add(record.file_path, Priority::High, true);
        repaired += 1;
    }
    Ok(repaired)
}

/// Deletes Documents with zero chunks whose ledger record is missing or not
/// `Completed`. The intentional empty-document sentinel (spec §4.6, §7:
/// extraction produced zero chunks, recorded so the file is not
/// re-attempted) has a `Completed` ledger record and is left alone —
/// sweeping it would defeat its entire purpose by triggering endless
/// re-extraction of the same empty file. This only targets zero-chunk
/// Documents that never got a matching ledger transition, which indicates a
/// write that was interrupted partway.
pub fn sweep_empty_documents(store: &Store) -> anyhow::Result<usize> {
    let mut swept = 0;
    for doc in store.sqlite.empty_documents().context("loading empty documents")? {
        let progress = store.sqlite.get_progress(&doc.file_path).context("checking ledger record")?;
        let is_intentional_sentinel = matches!(progress.as_ref().map(|p| p.status), Some(ProgressStatus::Completed));
        if is_intentional_sentinel {
            continue;
        }
        store.delete_document(&doc.file_path).with_context(|| format!("deleting orphan empty document: {}", doc.file_path))?;
        swept += 1;
    }
    Ok(swept)
}

/// Detect-only: counts `vectors` rows with no matching `chunks` row. Logged,
/// not repaired automatically — repair is the explicit `rebuild hnsw`
/// maintenance operation (spec §4.8.3/§4.8.6).
pub fn check_hnsw_health(store: &Store) -> anyhow::Result<u32> {
    store.sqlite.count_orphan_vectors().context("counting orphan vectors")
}

/// Runs the full startup sequence in order: resume, orphan repair, empty
/// document sweep, HNSW health check. Rebuilds are deliberately not run
/// here; they are exposed separately as on-demand maintenance operations.
///
/// `options` gates the two steps spec §6 exposes as independent toggles
/// (`AUTO_REPAIR_ORPHANS`, `CHECK_HNSW_HEALTH`); resume and the empty
/// document sweep always run since skipping them would leave the ledger
/// wedged rather than just skip an optional check.
pub fn run_startup_self_heal(store: &Store, queue: &IndexingQueue, options: SelfHealOptions) -> anyhow::Result<SelfHealReport> {
    let (resumed, missing_at_resume) = resume_in_progress(store, queue)?;

    let orphans_repaired = if options.auto_repair_orphans {
        repair_orphan_progress_records(store, queue)?
    } else {
        tracing::info!("orphan progress record repair skipped (AUTO_REPAIR_ORPHANS=false)");
        0
    };

    let empty_documents_swept = sweep_empty_documents(store)?;

    let orphan_vector_count = if options.check_hnsw_health {
        check_hnsw_health(store)?
    } else {
        tracing::info!("hnsw health check skipped (CHECK_HNSW_HEALTH=false)");
        0
    };

    if options.check_hnsw_health && orphan_vector_count > 0 {
        tracing::warn!(orphan_vector_count, "hnsw health check found orphan vectors; run the hnsw rebuild maintenance operation to repair");
    }
    tracing::info!(resumed, missing_at_resume, orphans_repaired, empty_documents_swept, "startup self-heal complete");

    Ok(SelfHealReport {
        resumed,
        missing_at_resume,
        orphans_repaired,
        empty_documents_swept,
        orphan_vector_count,
        orphan_repair_skipped: !options.auto_repair_orphans,
        hnsw_health_check_skipped: !options.check_hnsw_health,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::ChunkId;
    use chunk_model::{ChunkRecord, DocumentId};
    use std::collections::BTreeMap;
    use std::io::Write;

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

    #[test]
    fn resume_requeues_existing_files_and_rejects_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::File::create(&present).unwrap().write_all(b"hi").unwrap();
        let present = present.to_string_lossy().to_string();
        let missing = dir.path().join("missing.txt").to_string_lossy().to_string();

        let store = Store::open_in_memory(4).unwrap();
        store.sqlite.start_processing(&present, "h1").unwrap();
        store.sqlite.start_processing(&missing, "h2").unwrap();

        let queue = IndexingQueue::new();
        let (resumed, missing_count) = resume_in_progress(&store, &queue).unwrap();
        assert_eq!(resumed, 1);
        assert_eq!(missing_count, 1);
        assert_eq!(queue.size(), 1);

        let missing_record = store.sqlite.get_progress(&missing).unwrap().unwrap();
        assert_eq!(missing_record.status, ProgressStatus::Rejected);
    }

    #[test]
    fn orphan_progress_record_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();
        let path = path.to_string_lossy().to_string();

        let store = Store::open_in_memory(4).unwrap();
        store.sqlite.start_processing(&path, "h1").unwrap();
        store.sqlite.mark_completed(&path, 3).unwrap();

        let queue = IndexingQueue::new();
        let repaired = repair_orphan_progress_records(&store, &queue).unwrap();
        assert_eq!(repaired, 1);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn completed_empty_sentinel_document_is_not_swept() {
        let store = Store::open_in_memory(4).unwrap();
        store.sqlite.start_processing("empty.bin", "h1").unwrap();
        store.add_document("empty.bin", "h1", "unsupported", &[], &[]).unwrap();
        store.sqlite.mark_completed("empty.bin", 0).unwrap();

        let swept = sweep_empty_documents(&store).unwrap();
        assert_eq!(swept, 0);
        assert!(store.sqlite.get_document_info("empty.bin").unwrap().is_some());
    }

    #[test]
    fn orphan_empty_document_without_completed_ledger_is_swept() {
        let store = Store::open_in_memory(4).unwrap();
        store.add_document("orphan.bin", "h1", "unsupported", &[], &[]).unwrap();

        let swept = sweep_empty_documents(&store).unwrap();
        assert_eq!(swept, 1);
        assert!(store.sqlite.get_document_info("orphan.bin").unwrap().is_none());
    }

    #[test]
    fn startup_self_heal_skips_orphan_repair_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();
        let path = path.to_string_lossy().to_string();

        let store = Store::open_in_memory(4).unwrap();
        store.sqlite.start_processing(&path, "h1").unwrap();
        store.sqlite.mark_completed(&path, 3).unwrap();

        let queue = IndexingQueue::new();
        let options = SelfHealOptions { auto_repair_orphans: false, check_hnsw_health: true };
        let report = run_startup_self_heal(&store, &queue, options).unwrap();

        assert_eq!(report.orphans_repaired, 0);
        assert!(report.orphan_repair_skipped);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn startup_self_heal_skips_hnsw_health_check_when_disabled() {
        let store = Store::open_in_memory(4).unwrap();
        let queue = IndexingQueue::new();
        let options = SelfHealOptions { auto_repair_orphans: true, check_hnsw_health: false };
        let report = run_startup_self_heal(&store, &queue, options).unwrap();

        assert_eq!(report.orphan_vector_count, 0);
        assert!(report.hnsw_health_check_skipped);
    }

    #[test]
    fn rebuild_vector_and_lexical_indexes_restore_search() {
        let store = Store::open_in_memory(2).unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "the quick brown fox")];
        let embeddings = vec![vec![1.0, 0.0]];
        store.add_document("a.txt", "h1", "txt", &chunks, &embeddings).unwrap();

        assert_eq!(store.rebuild_vector_index().unwrap(), 1);
        assert_eq!(store.rebuild_lexical_index().unwrap(), 1);
        assert_eq!(store.vectors.len(), 1);
        assert_eq!(store.lexical.search("fox", 5).unwrap().len(), 1);
    }
}
