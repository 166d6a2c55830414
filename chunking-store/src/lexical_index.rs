//! Lexical Index (C3): a tokenized BM25 index over chunk text, backed by
//! `tantivy`. Insert/delete mirror the chunk table 1:1 by `chunk_id`.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, NumericOptions, Schema, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, Term};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub chunk_id: i64,
    /// BM25 score as returned by tantivy, not yet normalized.
    pub bm25_rank: f32,
}

pub trait LexicalIndex: Send + Sync {
    fn add(&self, chunk_id: i64, doc_id: &str, source_uri: &str, text: &str) -> StoreResult<()>;
    fn delete(&self, chunk_id: i64) -> StoreResult<()>;
    fn search(&self, query_text: &str, k: usize) -> StoreResult<Vec<LexicalHit>>;
    fn len(&self) -> usize;
    /// Drop every document and re-populate from `rows`
    /// (`chunk_id, doc_id, source_uri, text`), used by an on-demand FTS
    /// rebuild (spec §4.8.6).
    fn rebuild(&self, rows: &[(i64, String, String, String)]) -> StoreResult<()>;
}

struct Fields {
    text: Field,
    chunk_id: Field,
    doc_id: Field,
    source_uri: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let text = builder.add_text_field("text", TEXT);
    let id_opts = NumericOptions::default().set_fast().set_indexed().set_stored();
    let chunk_id = builder.add_i64_field("chunk_id", id_opts);
    let doc_id = builder.add_text_field("doc_id", STRING);
    let source_uri = builder.add_text_field("source_uri", STRING | STORED);
    let schema = builder.build();
    (schema, Fields { text, chunk_id, doc_id, source_uri })
}

pub struct TantivyLexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

impl TantivyLexicalIndex {
    pub fn open_or_create(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();
        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| StoreError::VectorIndex(format!("failed to open tantivy directory: {e}")))?;
        let index = Index::open_or_create(mmap_dir, schema)?;
        let reader = index.reader()?;
        let writer = index.writer(50_000_000)?;
        Ok(Self { index, reader, writer: Mutex::new(writer), fields })
    }

    pub fn create_in_ram() -> StoreResult<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        let reader = index.reader()?;
        let writer = index.writer(50_000_000)?;
        Ok(Self { index, reader, writer: Mutex::new(writer), fields })
    }
}

impl LexicalIndex for TantivyLexicalIndex {
    fn add(&self, chunk_id: i64, doc_id: &str, source_uri: &str, text: &str) -> StoreResult<()> {
        let mut writer = self.writer.lock().expect("tantivy writer lock poisoned");
        // Upsert semantics: clear any existing entry for this chunk first.
        writer.delete_term(Term::from_field_i64(self.fields.chunk_id, chunk_id));
        writer.add_document(doc!(
            self.fields.chunk_id => chunk_id,
            self.fields.doc_id => doc_id,
            self.fields.source_uri => source_uri,
            self.fields.text => text,
        ))?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn delete(&self, chunk_id: i64) -> StoreResult<()> {
        let mut writer = self.writer.lock().expect("tantivy writer lock poisoned");
        writer.delete_term(Term::from_field_i64(self.fields.chunk_id, chunk_id));
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn search(&self, query_text: &str, k: usize) -> StoreResult<Vec<LexicalHit>> {
        if query_text.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let parser = QueryParser::for_index(&self.index, vec![self.fields.text, self.fields.doc_id, self.fields.source_uri]);
        let query = parser.parse_query(query_text)?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(k))?;
        let mut out = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let retrieved = searcher.doc::<tantivy::schema::document::TantivyDocument>(addr)?;
            if let Some(tantivy::schema::OwnedValue::I64(id)) = retrieved.get_first(self.fields.chunk_id) {
                out.push(LexicalHit { chunk_id: *id, bm25_rank: score });
            }
        }
        Ok(out)
    }

    fn len(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    fn rebuild(&self, rows: &[(i64, String, String, String)]) -> StoreResult<()> {
        let mut writer = self.writer.lock().expect("tantivy writer lock poisoned");
        writer.delete_all_documents()?;
        for (chunk_id, doc_id, source_uri, text) in rows {
            writer.add_document(doc!(
                self.fields.chunk_id => *chunk_id,
                self.fields.doc_id => doc_id.as_str(),
                self.fields.source_uri => source_uri.as_str(),
                self.fields.text => text.as_str(),
            ))?;
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_chunk_by_term() {
        let idx = TantivyLexicalIndex::create_in_ram().unwrap();
        idx.add(1, "doc-a", "a.txt", "the quick brown fox").unwrap();
        idx.add(2, "doc-b", "b.txt", "a lazy dog sleeps").unwrap();

        let hits = idx.search("fox", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, 1);
    }

    #[test]
    fn delete_removes_chunk_from_results() {
        let idx = TantivyLexicalIndex::create_in_ram().unwrap();
        idx.add(1, "doc-a", "a.txt", "the quick brown fox").unwrap();
        idx.delete(1).unwrap();
        assert!(idx.search("fox", 5).unwrap().is_empty());
    }
}
