//! Relational store (C1) and Progress Ledger (C4). Both live on the same
//! SQLite connection and the same write lock, since the atomic
//! `add_document` write and ledger transitions are frequently part of the
//! same logical operation (spec §4.1/§4.4).

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use chunk_model::{ChunkRecord, ProgressRecord, ProgressStatus};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::schema;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// A single embedding ready to persist, paired with the chunk it belongs to
/// by position (`embeddings[i]` corresponds to `chunks[i]`).
pub struct NewDocument<'a> {
    pub file_path: &'a str,
    pub file_hash: &'a str,
    pub extraction_method: &'a str,
    pub chunks: &'a [ChunkRecord],
    pub embeddings: &'a [Vec<f32>],
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub id: i64,
    pub file_path: String,
    pub file_hash: String,
    pub indexed_at: String,
    pub extraction_method: Option<String>,
    pub chunk_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub found: bool,
    pub chunks_deleted: u32,
}

/// One persisted chunk row, as returned to callers assembling a
/// `VectorIndex`/`LexicalIndex` from durable state (startup load, rebuild).
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedChunk {
    pub chunk_id: i64,
    pub document_id: i64,
    pub content: String,
    pub page: Option<i64>,
    pub chunk_index: i64,
    pub embedding: Option<Vec<f32>>,
}

/// A chunk joined with its owning document's `file_path`, for hydrating
/// search results with a source path (spec §4.7 needs `source`, `page`,
/// `content` per hit, none of which the vector/lexical indexes carry).
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDetail {
    pub chunk_id: i64,
    pub file_path: String,
    pub content: String,
    pub page: Option<i64>,
}

/// C1 + C4: the single SQLite-backed relational store. Writes serialize on
/// `conn`; readers needing true concurrency should open their own read-only
/// connection against the same WAL-mode database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        schema::apply(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ---- C1: Chunk/Embedding Store -----------------------------------

    /// Atomic: Document + N Chunks + N Vectors + N FTS-mirror rows commit
    /// together or not at all. `embeddings[i]` is packed little-endian
    /// float32 and stored alongside its chunk; the caller is responsible for
    /// also feeding the same rows into the live vector/lexical indexes
    /// (the store only owns the durable copy, not the in-memory indexes).
    pub fn add_document(&self, doc: NewDocument<'_>) -> StoreResult<i64> {
        if doc.chunks.len() != doc.embeddings.len() {
            return Err(StoreError::Inconsistent(format!(
                "chunk count {} != embedding count {}",
                doc.chunks.len(),
                doc.embeddings.len()
            )));
        }

        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM documents WHERE file_path = ?1", params![doc.file_path], |r| r.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicatePath(doc.file_path.to_string()));
        }

        tx.execute(
            "INSERT INTO documents (file_path, file_hash, indexed_at, extraction_method) VALUES (?1, ?2, ?3, ?4)",
            params![doc.file_path, doc.file_hash, now_rfc3339(), doc.extraction_method],
        )?;
        let doc_id = tx.last_insert_rowid();

        for (chunk, embedding) in doc.chunks.iter().zip(doc.embeddings.iter()) {
            tx.execute(
                "INSERT INTO chunks (document_id, content, page, chunk_index) VALUES (?1, ?2, ?3, ?4)",
                params![doc_id, chunk.text, chunk.page_start.map(|p| p as i64), chunk.chunk_index as i64],
            )?;
            let chunk_id = tx.last_insert_rowid();

            let bytes: &[u8] = bytemuck::cast_slice(embedding.as_slice());
            tx.execute(
                "INSERT INTO vectors (chunk_id, embedding, dim) VALUES (?1, ?2, ?3)",
                params![chunk_id, bytes, embedding.len() as i64],
            )?;
            tx.execute("INSERT INTO fts_chunks (chunk_id) VALUES (?1)", params![chunk_id])?;
        }

        tx.commit()?;
        Ok(doc_id)
    }

    /// Cascades through chunks → vectors → fts via `ON DELETE CASCADE`.
    /// Idempotent: deleting an absent path returns `found: false`.
    pub fn delete_document(&self, file_path: &str) -> StoreResult<DeleteOutcome> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let doc_id: Option<i64> =
            conn.query_row("SELECT id FROM documents WHERE file_path = ?1", params![file_path], |r| r.get(0)).optional()?;
        let Some(doc_id) = doc_id else {
            return Ok(DeleteOutcome { found: false, chunks_deleted: 0 });
        };
        let chunks_deleted: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks WHERE document_id = ?1", params![doc_id], |r| r.get(0))?;
        conn.execute("DELETE FROM documents WHERE id = ?1", params![doc_id])?;
        conn.execute("DELETE FROM progress WHERE file_path = ?1", params![file_path])?;
        Ok(DeleteOutcome { found: true, chunks_deleted: chunks_deleted as u32 })
    }

    /// True iff a Document row exists with matching `(path, hash)`.
    pub fn is_document_indexed(&self, file_path: &str, file_hash: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE file_path = ?1 AND file_hash = ?2",
            params![file_path, file_hash],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_document_info(&self, file_path: &str) -> StoreResult<Option<DocumentInfo>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row(
            "SELECT d.id, d.file_path, d.file_hash, d.indexed_at, d.extraction_method,
                    (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id)
             FROM documents d WHERE d.file_path = ?1",
            params![file_path],
            |r| {
                Ok(DocumentInfo {
                    id: r.get(0)?,
                    file_path: r.get(1)?,
                    file_hash: r.get(2)?,
                    indexed_at: r.get(3)?,
                    extraction_method: r.get(4)?,
                    chunk_count: r.get::<_, i64>(5)? as u32,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn query_documents_with_chunks(&self) -> StoreResult<Vec<DocumentInfo>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT d.id, d.file_path, d.file_hash, d.indexed_at, d.extraction_method,
                    (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id)
             FROM documents d ORDER BY d.id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(DocumentInfo {
                id: r.get(0)?,
                file_path: r.get(1)?,
                file_hash: r.get(2)?,
                indexed_at: r.get(3)?,
                extraction_method: r.get(4)?,
                chunk_count: r.get::<_, i64>(5)? as u32,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// All persisted chunks joined with their vector (if any), for rebuilding
    /// the in-memory vector/lexical indexes on startup or during self-heal.
    pub fn all_chunks_with_vectors(&self) -> StoreResult<Vec<PersistedChunk>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT c.id, c.document_id, c.content, c.page, c.chunk_index, v.embedding, v.dim
             FROM chunks c LEFT JOIN vectors v ON v.chunk_id = c.id
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map([], |r| {
            let raw: Option<Vec<u8>> = r.get(5)?;
            let dim: Option<i64> = r.get(6)?;
            let embedding = match (raw, dim) {
                (Some(bytes), Some(dim)) => Some(bytemuck::cast_slice::<u8, f32>(&bytes)[..dim as usize].to_vec()),
                _ => None,
            };
            Ok(PersistedChunk {
                chunk_id: r.get(0)?,
                document_id: r.get(1)?,
                content: r.get(2)?,
                page: r.get(3)?,
                chunk_index: r.get(4)?,
                embedding,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Vector or FTS rows whose `chunk_id` is absent from `chunks` (spec
    /// §4.8.5's HNSW health check is driven from the live index instead;
    /// this covers the durable-table side of the same consistency rule).
    pub fn count_orphan_vectors(&self) -> StoreResult<u32> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vectors v WHERE NOT EXISTS (SELECT 1 FROM chunks c WHERE c.id = v.chunk_id)",
            [],
            |r| r.get(0),
        )?;
        Ok(n as u32)
    }

    /// Documents with zero chunks, candidates for the self-heal empty-doc
    /// sweep (spec §4.8.4).
    pub fn empty_documents(&self) -> StoreResult<Vec<DocumentInfo>> {
        Ok(self.query_documents_with_chunks()?.into_iter().filter(|d| d.chunk_count == 0).collect())
    }

    /// Non-empty documents where at least one chunk has no matching vector
    /// row, surfaced as `missing_embeddings` in the integrity report (spec
    /// §8 scenario 4).
    pub fn documents_missing_embeddings(&self) -> StoreResult<Vec<DocumentInfo>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT d.id, d.file_path, d.file_hash, d.indexed_at, d.extraction_method,
                    (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id)
             FROM documents d
             WHERE EXISTS (
                 SELECT 1 FROM chunks c
                 WHERE c.document_id = d.id
                 AND NOT EXISTS (SELECT 1 FROM vectors v WHERE v.chunk_id = c.id)
             )
             ORDER BY d.id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(DocumentInfo {
                id: r.get(0)?,
                file_path: r.get(1)?,
                file_hash: r.get(2)?,
                indexed_at: r.get(3)?,
                extraction_method: r.get(4)?,
                chunk_count: r.get::<_, i64>(5)? as u32,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Looks up `(file_path, content, page)` for a batch of chunk ids, used
    /// by the hybrid search executor to hydrate raw vector/lexical hits
    /// into result rows. Ids with no matching chunk (e.g. a stale HNSW
    /// tombstone candidate) are silently omitted.
    pub fn get_chunks_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<ChunkDetail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().expect("store lock poisoned");
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT c.id, d.file_path, c.content, c.page
             FROM chunks c JOIN documents d ON d.id = c.document_id
             WHERE c.id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(ids.iter());
        let rows = stmt.query_map(params, |r| {
            Ok(ChunkDetail { chunk_id: r.get(0)?, file_path: r.get(1)?, content: r.get(2)?, page: r.get(3)? })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // ---- Query-expansion cache -----------------------------------------

    pub fn get_cached_expansion(&self, model: &str, query: &str) -> StoreResult<Option<Vec<String>>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let raw: Option<String> = conn
            .query_row(
                "SELECT expansions FROM query_expansion_cache WHERE model = ?1 AND query = ?2",
                params![model, query],
                |r| r.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| s.split('\u{1f}').map(|p| p.to_string()).collect()))
    }

    pub fn put_cached_expansion(&self, model: &str, query: &str, expansions: &[String]) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let joined = expansions.join("\u{1f}");
        conn.execute(
            "INSERT INTO query_expansion_cache (model, query, expansions, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(model, query) DO UPDATE SET expansions = excluded.expansions, created_at = excluded.created_at",
            params![model, query, joined, now_rfc3339()],
        )?;
        Ok(())
    }

    // ---- C4: Progress Ledger ------------------------------------------

    /// Creates or resets a record to `in_progress` with a fresh timestamp.
    /// Idempotent re-entry: calling this on an existing record of any status
    /// resets it, matching the "fresh `start_processing`" rule in §4.4.
    pub fn start_processing(&self, file_path: &str, file_hash: &str) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO progress (file_path, file_hash, status, chunks_processed, total_chunks, error_message, last_updated)
             VALUES (?1, ?2, ?3, 0, 0, NULL, ?4)
             ON CONFLICT(file_path) DO UPDATE SET
                file_hash = excluded.file_hash,
                status = excluded.status,
                chunks_processed = 0,
                total_chunks = 0,
                error_message = NULL,
                last_updated = excluded.last_updated",
            params![file_path, file_hash, ProgressStatus::InProgress.as_str(), now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn mark_completed(&self, file_path: &str, total_chunks: u32) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "UPDATE progress SET status = ?1, chunks_processed = ?2, total_chunks = ?2, last_updated = ?3 WHERE file_path = ?4",
            params![ProgressStatus::Completed.as_str(), total_chunks as i64, now_rfc3339(), file_path],
        )?;
        Ok(())
    }

    pub fn mark_rejected(&self, file_path: &str, error_message: &str) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "UPDATE progress SET status = ?1, error_message = ?2, last_updated = ?3 WHERE file_path = ?4",
            params![ProgressStatus::Rejected.as_str(), error_message, now_rfc3339(), file_path],
        )?;
        Ok(())
    }

    pub fn get_progress(&self, file_path: &str) -> StoreResult<Option<ProgressRecord>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row(
            "SELECT file_path, file_hash, status, chunks_processed, total_chunks, error_message, last_updated
             FROM progress WHERE file_path = ?1",
            params![file_path],
            Self::row_to_progress,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Batch preload of every ledger row in one query, used by integrity
    /// reports to avoid N+1 lookups (spec §4.4).
    pub fn all_progress(&self) -> StoreResult<Vec<ProgressRecord>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT file_path, file_hash, status, chunks_processed, total_chunks, error_message, last_updated FROM progress",
        )?;
        let rows = stmt.query_map([], Self::row_to_progress)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn progress_by_status(&self, status: ProgressStatus) -> StoreResult<Vec<ProgressRecord>> {
        Ok(self.all_progress()?.into_iter().filter(|p| p.status == status).collect())
    }

    fn row_to_progress(r: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressRecord> {
        let status_str: String = r.get(2)?;
        let status = status_str.parse().unwrap_or(ProgressStatus::Rejected);
        Ok(ProgressRecord {
            file_path: r.get(0)?,
            file_hash: r.get(1)?,
            status,
            chunks_processed: r.get::<_, i64>(3)? as u32,
            total_chunks: r.get::<_, i64>(4)? as u32,
            error_message: r.get(5)?,
            last_updated: r.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::{ChunkId, DocumentId};
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
    fn add_document_is_atomic_and_queryable() {
        let store = SqliteStore::open_in_memory().unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "hello"), sample_chunk(&doc_id, 1, "world")];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];

        let id = store
            .add_document(NewDocument {
                file_path: "a.txt",
                file_hash: "hash1",
                extraction_method: "txt",
                chunks: &chunks,
                embeddings: &embeddings,
            })
            .unwrap();
        assert!(id > 0);

        assert!(store.is_document_indexed("a.txt", "hash1").unwrap());
        assert!(!store.is_document_indexed("a.txt", "hash2").unwrap());

        let info = store.get_document_info("a.txt").unwrap().unwrap();
        assert_eq!(info.chunk_count, 2);

        let persisted = store.all_chunks_with_vectors().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].embedding.as_ref().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn add_document_rejects_duplicate_path() {
        let store = SqliteStore::open_in_memory().unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "hello")];
        let embeddings = vec![vec![1.0, 0.0]];

        store
            .add_document(NewDocument { file_path: "a.txt", file_hash: "h1", extraction_method: "txt", chunks: &chunks, embeddings: &embeddings })
            .unwrap();
        let err = store
            .add_document(NewDocument { file_path: "a.txt", file_hash: "h2", extraction_method: "txt", chunks: &chunks, embeddings: &embeddings })
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePath(_)));
    }

    #[test]
    fn delete_document_cascades_and_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "hello")];
        let embeddings = vec![vec![1.0, 0.0]];
        store
            .add_document(NewDocument { file_path: "a.txt", file_hash: "h1", extraction_method: "txt", chunks: &chunks, embeddings: &embeddings })
            .unwrap();

        let outcome = store.delete_document("a.txt").unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.chunks_deleted, 1);
        assert!(store.get_document_info("a.txt").unwrap().is_none());

        let second = store.delete_document("a.txt").unwrap();
        assert!(!second.found);
        assert_eq!(second.chunks_deleted, 0);
    }

    #[test]
    fn progress_ledger_transitions() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.start_processing("a.txt", "h1").unwrap();
        let p = store.get_progress("a.txt").unwrap().unwrap();
        assert_eq!(p.status, ProgressStatus::InProgress);

        store.mark_completed("a.txt", 3).unwrap();
        let p = store.get_progress("a.txt").unwrap().unwrap();
        assert_eq!(p.status, ProgressStatus::Completed);
        assert_eq!(p.total_chunks, 3);

        // Fresh start_processing resets a terminal record.
        store.start_processing("a.txt", "h2").unwrap();
        let p = store.get_progress("a.txt").unwrap().unwrap();
        assert_eq!(p.status, ProgressStatus::InProgress);
        assert_eq!(p.file_hash, "h2");
    }

    #[test]
    fn progress_ledger_rejected_records_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.start_processing("a.txt", "h1").unwrap();
        store.mark_rejected("a.txt", "extraction failed: bad zip").unwrap();
        let p = store.get_progress("a.txt").unwrap().unwrap();
        assert_eq!(p.status, ProgressStatus::Rejected);
        assert_eq!(p.error_message.as_deref(), Some("extraction failed: bad zip"));
    }

    #[test]
    fn delete_document_also_clears_progress_record() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.start_processing("a.txt", "h1").unwrap();
        store.mark_completed("a.txt", 0).unwrap();
        store.delete_document("a.txt").unwrap();
        assert!(store.get_progress("a.txt").unwrap().is_none());
    }
}
