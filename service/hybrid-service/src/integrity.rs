//! `GET /documents/integrity` (spec §6): a read-only health report over the
//! durable SQLite state, independent of whether the HNSW/FTS indexes agree
//! with it. Exists so an operator can tell "indexed but nothing ever
//! searches it" apart from "not indexed at all" without reading logs.

use serde::Serialize;

use chunking_store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// A document row with zero chunks that isn't the recognized
    /// empty-document sentinel (spec §4.8's `sweep_empty_documents`
    /// carve-out) — it never finished a completed indexing pass.
    EmptyDocument { file_path: String },
    /// Chunk rows exist for this document but at least one never received
    /// an embedding, so it is invisible to vector retrieval.
    MissingEmbeddings { file_path: String, chunk_count: u32 },
    /// A `Completed` progress record whose document row no longer exists —
    /// the document was deleted without the progress ledger being cleared.
    OrphanProgressRecord { file_path: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub total_documents: usize,
    pub total_chunks: u64,
    pub issues: Vec<IntegrityIssue>,
}

pub fn compute(store: &Store) -> chunking_store::StoreResult<IntegrityReport> {
    let documents = store.sqlite.query_documents_with_chunks()?;
    let total_documents = documents.len();
    let total_chunks: u64 = documents.iter().map(|d| d.chunk_count as u64).sum();

    let mut issues = Vec::new();

    for doc in store.sqlite.empty_documents()? {
        issues.push(IntegrityIssue::EmptyDocument { file_path: doc.file_path });
    }

    for doc in store.sqlite.documents_missing_embeddings()? {
        issues.push(IntegrityIssue::MissingEmbeddings { file_path: doc.file_path, chunk_count: doc.chunk_count });
    }

    for progress in store.sqlite.progress_by_status(chunk_model::ProgressStatus::Completed)? {
        if store.sqlite.get_document_info(&progress.file_path)?.is_none() {
            issues.push(IntegrityIssue::OrphanProgressRecord { file_path: progress.file_path });
        }
    }

    Ok(IntegrityReport { total_documents, total_chunks, issues })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::{ChunkId, ChunkRecord, DocumentId};
    use std::collections::BTreeMap;

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
    fn clean_store_reports_no_issues() {
        let store = Store::open_in_memory(2).unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "hello world")];
        store.add_document("a.txt", "h1", "txt", &chunks, &[vec![1.0, 0.0]]).unwrap();

        let report = compute(&store).unwrap();
        assert_eq!(report.total_documents, 1);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn flags_orphan_progress_record() {
        let store = Store::open_in_memory(2).unwrap();
        store.sqlite.start_processing("gone.txt", "h1").unwrap();
        store.sqlite.mark_completed("gone.txt", 3).unwrap();

        let report = compute(&store).unwrap();
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, IntegrityIssue::OrphanProgressRecord { file_path } if file_path == "gone.txt")));
    }
}
