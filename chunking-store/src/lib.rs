//! C1 (Store), C2 (Vector Index), C3 (Lexical Index) and C4 (Progress
//! Ledger): the persisted state of the system and its two search indexes.
//!
//! The durable source of truth is SQLite (`sqlite_store`); the HNSW and
//! tantivy indexes are derived, rebuildable views over the same `vectors` /
//! `chunks` rows, loaded into memory at startup and kept in sync by the
//! pipeline coordinator's Store stage.

pub mod error;
pub mod lexical_index;
pub mod schema;
pub mod sqlite_store;
pub mod vector_index;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chunk_model::ChunkRecord;

pub use error::{StoreError, StoreResult};
pub use lexical_index::{LexicalHit, LexicalIndex, TantivyLexicalIndex};
pub use sqlite_store::{ChunkDetail, DeleteOutcome, DocumentInfo, NewDocument, PersistedChunk, SqliteStore};
pub use vector_index::{HnswVectorIndex, InMemoryVectorIndex, VectorHit, VectorIndex};

/// Everything C1–C4 touch, wired together behind one handle. `add_document`
/// here is the atomic write described in spec §4.1: it writes the durable
/// SQLite rows and feeds the same rows into the live vector/lexical indexes
/// under the same call, so a reader never observes the SQL side without the
/// index side or vice versa.
pub struct Store {
    pub sqlite: SqliteStore,
    pub vectors: Arc<dyn VectorIndex>,
    pub lexical: Arc<dyn LexicalIndex>,
    data_dir: Option<PathBuf>,
}

impl Store {
    pub fn open(data_dir: &Path, dim: usize) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let sqlite = SqliteStore::open(&data_dir.join("store.sqlite3"))?;
        let vectors: Arc<dyn VectorIndex> = Arc::new(HnswVectorIndex::load_or_new(&data_dir.join("hnsw"), dim)?);
        let lexical: Arc<dyn LexicalIndex> = Arc::new(TantivyLexicalIndex::open_or_create(&data_dir.join("fts"))?);
        let store = Self { sqlite, vectors, lexical, data_dir: Some(data_dir.to_path_buf()) };
        store.load_indexes_from_disk()?;
        Ok(store)
    }

    pub fn open_in_memory(dim: usize) -> StoreResult<Self> {
        Ok(Self {
            sqlite: SqliteStore::open_in_memory()?,
            vectors: Arc::new(InMemoryVectorIndex::new(dim)),
            lexical: Arc::new(TantivyLexicalIndex::create_in_ram()?),
            data_dir: None,
        })
    }

    /// Dumps the vector index to disk if this store is disk-backed. No-op
    /// for `open_in_memory` stores. Tantivy commits its own writes as it
    /// goes, so only the HNSW graph needs an explicit flush point.
    pub fn persist(&self) -> StoreResult<()> {
        if let Some(dir) = &self.data_dir {
            self.vectors.persist(&dir.join("hnsw"))?;
        }
        Ok(())
    }

    /// On-demand rebuild of the vector index from the durable SQLite rows
    /// (spec §4.8.6). Returns the number of vectors re-inserted.
    pub fn rebuild_vector_index(&self) -> StoreResult<usize> {
        let rows = self.sqlite.all_chunks_with_vectors()?;
        let pairs: Vec<(i64, Vec<f32>)> = rows.into_iter().filter_map(|r| r.embedding.map(|e| (r.chunk_id, e))).collect();
        let n = pairs.len();
        self.vectors.rebuild_from(&pairs)?;
        self.persist()?;
        Ok(n)
    }

    /// On-demand rebuild of the lexical index from the durable SQLite rows
    /// (spec §4.8.6). Returns the number of documents re-inserted.
    pub fn rebuild_lexical_index(&self) -> StoreResult<usize> {
        let rows = self.sqlite.all_chunks_with_vectors()?;
        let tuples: Vec<(i64, String, String, String)> =
            rows.into_iter().map(|r| (r.chunk_id, r.document_id.to_string(), r.document_id.to_string(), r.content)).collect();
        let n = tuples.len();
        self.lexical.rebuild(&tuples)?;
        Ok(n)
    }

    /// Populate the in-memory vector/lexical indexes from the durable SQLite
    /// rows. Called once at startup; a freshly-created `HnswVectorIndex` or
    /// tantivy index otherwise starts empty even though the SQL rows exist.
    fn load_indexes_from_disk(&self) -> StoreResult<()> {
        for row in self.sqlite.all_chunks_with_vectors()? {
            if let Some(embedding) = &row.embedding {
                self.vectors.add(row.chunk_id, embedding)?;
            }
            let doc_tag = row.document_id.to_string();
            self.lexical.add(row.chunk_id, &doc_tag, &doc_tag, &row.content)?;
        }
        Ok(())
    }

    /// Atomic Document + Chunks + Vectors + FTS write (spec §4.1), followed
    /// by feeding the same rows into the live indexes.
    pub fn add_document(
        &self,
        file_path: &str,
        file_hash: &str,
        extraction_method: &str,
        chunks: &[ChunkRecord],
        embeddings: &[Vec<f32>],
    ) -> StoreResult<i64> {
        let doc_id = self.sqlite.add_document(NewDocument { file_path, file_hash, extraction_method, chunks, embeddings })?;
        let persisted = self.sqlite.all_chunks_with_vectors()?;
        let new_chunk_ids: Vec<i64> =
            persisted.iter().filter(|c| c.document_id == doc_id).map(|c| c.chunk_id).collect();
        for (chunk_id, (chunk, embedding)) in new_chunk_ids.iter().zip(chunks.iter().zip(embeddings.iter())) {
            self.vectors.add(*chunk_id, embedding)?;
            self.lexical.add(*chunk_id, chunk.doc_id.as_str(), &chunk.source_uri, &chunk.text)?;
        }
        Ok(doc_id)
    }

    /// Cascades the SQL delete, then tombstones the same chunk ids out of
    /// the live vector/lexical indexes.
    pub fn delete_document(&self, file_path: &str) -> StoreResult<DeleteOutcome> {
        let target_doc_id = self.sqlite.get_document_info(file_path)?.map(|d| d.id);
        let chunk_ids: Vec<i64> = match target_doc_id {
            Some(id) => self
                .sqlite
                .all_chunks_with_vectors()?
                .into_iter()
                .filter(|c| c.document_id == id)
                .map(|c| c.chunk_id)
                .collect(),
            None => Vec::new(),
        };
        let outcome = self.sqlite.delete_document(file_path)?;
        for chunk_id in chunk_ids {
            self.vectors.delete(chunk_id);
            self.lexical.delete(chunk_id)?;
        }
        Ok(outcome)
    }

    pub fn is_document_indexed(&self, file_path: &str, file_hash: &str) -> StoreResult<bool> {
        self.sqlite.is_document_indexed(file_path, file_hash)
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
    fn add_document_populates_both_indexes() {
        let store = Store::open_in_memory(2).unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "the quick brown fox")];
        let embeddings = vec![vec![1.0, 0.0]];

        store.add_document("a.txt", "h1", "txt", &chunks, &embeddings).unwrap();

        assert_eq!(store.vectors.len(), 1);
        let hits = store.lexical.search("fox", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn delete_document_clears_both_indexes() {
        let store = Store::open_in_memory(2).unwrap();
        let doc_id = DocumentId::from_path("a.txt");
        let chunks = vec![sample_chunk(&doc_id, 0, "the quick brown fox")];
        let embeddings = vec![vec![1.0, 0.0]];
        store.add_document("a.txt", "h1", "txt", &chunks, &embeddings).unwrap();

        store.delete_document("a.txt").unwrap();
        assert_eq!(store.vectors.len(), 0);
        assert!(store.lexical.search("fox", 5).unwrap().is_empty());
    }
}
