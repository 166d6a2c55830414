//! Shared data model used across the extraction, storage, indexing-pipeline,
//! and search crates. Nothing here talks to disk or to a database; it only
//! describes the shapes that flow between stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bumped whenever a breaking change is made to the persisted shapes below.
/// Carried on `FileRecord`/`ChunkRecord` so a store opened against an older
/// schema can detect the mismatch instead of silently misreading bytes.
pub const SCHEMA_MAJOR: u32 = 1;

/// A document identity, keyed by its source path. Two documents are the
/// same document iff their paths are equal; content changes are tracked via
/// `file_hash`/`content_sha256`, not via identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chunk identity assigned at extraction time, before the chunk has a row
/// id in the store. Format is `"{path}#{chunk_index}"`; `chunking-store`
/// assigns the durable integer rowid on insert and keeps this string as a
/// natural key for logging and dedup, not as the storage key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn new(doc_id: &DocumentId, chunk_index: u32) -> Self {
        Self(format!("{}#{}", doc_id.0, chunk_index))
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a [`UnifiedBlock`] as produced by an extractor, before chunking
/// collapses a run of blocks into contiguous text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Heading,
    Paragraph,
    ListItem,
    Code,
    Table,
}

/// A single sequential piece of extracted text, tagged with enough
/// structural metadata (heading level, page range, arbitrary attrs) that the
/// chunker can make boundary decisions without re-parsing the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedBlock {
    pub kind: BlockKind,
    pub text: String,
    pub order: u32,
    pub source_uri: String,
    pub reader_tag: String,
    pub heading_level: Option<u32>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub attrs: BTreeMap<String, String>,
}

impl UnifiedBlock {
    pub fn new(
        kind: BlockKind,
        text: impl Into<String>,
        order: u32,
        source_uri: impl Into<String>,
        reader_tag: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            order,
            source_uri: source_uri.into(),
            reader_tag: reader_tag.into(),
            heading_level: None,
            page_start: None,
            page_end: None,
            attrs: BTreeMap::new(),
        }
    }
}

/// File-level metadata gathered during extraction. One `FileRecord` is
/// produced per source file and persisted as a Document row by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub schema_version: u32,
    pub doc_id: DocumentId,
    pub doc_revision: Option<u32>,
    pub source_uri: String,
    pub source_mime: String,
    pub file_size_bytes: Option<u64>,
    pub content_sha256: Option<String>,
    pub page_count: Option<u32>,
    pub extracted_at: String,
    pub created_at_meta: Option<String>,
    pub updated_at_meta: Option<String>,
    pub title_guess: Option<String>,
    pub author_guess: Option<String>,
    pub dominant_lang: Option<String>,
    pub tags: Vec<String>,
    pub ingest_tool: Option<String>,
    pub ingest_tool_version: Option<String>,
    pub reader_backend: Option<String>,
    pub ocr_used: Option<bool>,
    pub ocr_langs: Vec<String>,
    pub chunk_count: Option<u32>,
    pub total_tokens: Option<u32>,
    pub meta: BTreeMap<String, String>,
    pub extra: BTreeMap<String, String>,
}

/// A chunk of extracted text, as produced by the Chunk stage, prior to
/// embedding and storage. `chunk_index` is the dense 0-based position of the
/// chunk within its document; the store relies on this being dense on
/// insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub schema_version: u32,
    pub doc_id: DocumentId,
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    pub source_uri: String,
    pub source_mime: String,
    pub extracted_at: String,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub text: String,
    pub section_path: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub extra: BTreeMap<String, String>,
}

/// Lifecycle state of a file in the progress ledger (C4). Transitions are
/// monotonic except that `InProgress` may be re-entered from a terminal
/// state only via a fresh `start_processing` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Rejected,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ProgressStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            "rejected" => Ok(ProgressStatus::Rejected),
            other => Err(format!("unknown progress status: {other}")),
        }
    }
}

/// A row in the progress ledger, keyed by `file_path`. Independent of
/// whether a Document row exists for the same path; used to detect orphans
/// and drive startup resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub file_path: String,
    pub file_hash: String,
    pub status: ProgressStatus,
    pub chunks_processed: u32,
    pub total_chunks: u32,
    pub error_message: Option<String>,
    pub last_updated: String,
}

/// Admission priority for the indexing queue. `High` is used for
/// self-heal-driven re-enqueues (orphan repair); everything else is
/// `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Normal,
    High,
}

/// An item sitting in the indexing queue (C5), ephemeral: never persisted
/// as such, reconstructed on resume from ProgressRecords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub path: String,
    pub priority: Priority,
    pub force: bool,
    pub enqueue_seq: u64,
}

impl QueueItem {
    pub fn new(path: impl Into<String>, priority: Priority, force: bool, enqueue_seq: u64) -> Self {
        Self { path: path.into(), priority, force, enqueue_seq }
    }
}

/// Ordering for the priority heap in C5: higher `Priority` first, then
/// lower `enqueue_seq` (earlier arrival) first. `BinaryHeap` is a max-heap,
/// so `Ord` here is defined so that "greater" means "should come out of the
/// queue first".
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueue_seq.cmp(&self.enqueue_seq))
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Stage-1 output: a file has been read and extracted into blocks, but not
/// yet chunked.
#[derive(Debug, Clone)]
pub struct ExtractedDoc {
    pub queue_item: QueueItem,
    pub file_hash: String,
    pub blocks: Vec<UnifiedBlock>,
    pub extraction_method: String,
}

/// Stage-2 output: a file has been chunked, but not yet embedded.
#[derive(Debug, Clone)]
pub struct ChunkedDoc {
    pub queue_item: QueueItem,
    pub file_hash: String,
    pub file: FileRecord,
    pub chunks: Vec<ChunkRecord>,
}

/// Stage-3 output: a file's chunks have been embedded and are ready for the
/// atomic Store write. `embeddings[i]` corresponds to `chunks[i]`.
#[derive(Debug, Clone)]
pub struct EmbeddedDoc {
    pub queue_item: QueueItem,
    pub file_hash: String,
    pub file: FileRecord,
    pub chunks: Vec<ChunkRecord>,
    pub embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_item_orders_high_before_normal() {
        let hi = QueueItem::new("a", Priority::High, false, 10);
        let lo = QueueItem::new("b", Priority::Normal, false, 1);
        assert!(hi > lo);
    }

    #[test]
    fn queue_item_orders_fifo_within_priority() {
        let earlier = QueueItem::new("a", Priority::Normal, false, 1);
        let later = QueueItem::new("b", Priority::Normal, false, 2);
        assert!(earlier > later, "lower enqueue_seq should be dequeued first");
    }

    #[test]
    fn progress_status_roundtrips_through_str() {
        for s in [ProgressStatus::InProgress, ProgressStatus::Completed, ProgressStatus::Rejected] {
            let parsed: ProgressStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
