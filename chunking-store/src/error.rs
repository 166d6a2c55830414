use thiserror::Error;

/// Errors raised by the chunk/embedding store (C1), its vector index (C2),
/// lexical index (C3), and progress ledger (C4). Kept as one enum because
/// all four share a single SQLite connection and a write lock; a caller one
/// layer up (the pipeline coordinator) maps these onto its own per-document
/// `Fail`/`Skip` outcome without needing to know which sub-component failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("tantivy query parse error: {0}")]
    TantivyQueryParse(#[from] tantivy::query::QueryParserError),

    #[error("vector index error: {0}")]
    VectorIndex(String),

    #[error("document already indexed: {0}")]
    DuplicatePath(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("schema version mismatch: store is v{on_disk}, binary expects v{expected}")]
    SchemaVersionMismatch { on_disk: u32, expected: u32 },

    #[error("inconsistent write: {0}")]
    Inconsistent(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
