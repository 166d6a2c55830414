use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// DDL applied to a fresh database. `vectors` holds the durable copy of
/// every embedding (the HNSW index is a derived, rebuildable artifact over
/// the same rows); `fts_chunks` is a thin mirror used only to answer
/// "does chunk N have an FTS entry" without opening the tantivy index, kept
/// in lock-step with the real tantivy writer inside the same transaction.
const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path          TEXT NOT NULL UNIQUE,
    file_hash          TEXT NOT NULL,
    indexed_at         TEXT NOT NULL,
    extraction_method  TEXT
);

CREATE TABLE IF NOT EXISTS chunks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id  INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    content      TEXT NOT NULL,
    page         INTEGER,
    chunk_index  INTEGER NOT NULL,
    UNIQUE(document_id, chunk_index)
);
CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);

CREATE TABLE IF NOT EXISTS vectors (
    chunk_id   INTEGER PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    embedding  BLOB NOT NULL,
    dim        INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fts_chunks (
    chunk_id   INTEGER PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS progress (
    file_path         TEXT PRIMARY KEY,
    file_hash         TEXT NOT NULL,
    status            TEXT NOT NULL,
    chunks_processed  INTEGER NOT NULL DEFAULT 0,
    total_chunks      INTEGER NOT NULL DEFAULT 0,
    error_message     TEXT,
    last_updated      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS query_expansion_cache (
    model      TEXT NOT NULL,
    query      TEXT NOT NULL,
    expansions TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (model, query)
);
"#;

pub fn apply(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(DDL)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let on_disk: Option<u32> = conn
        .query_row("SELECT value FROM schema_meta WHERE key = 'schema_major'", [], |r| r.get::<_, String>(0))
        .ok()
        .and_then(|s| s.parse().ok());

    match on_disk {
        None => {
            conn.execute(
                "INSERT INTO schema_meta(key, value) VALUES ('schema_major', ?1)",
                [chunk_model::SCHEMA_MAJOR.to_string()],
            )?;
        }
        Some(v) if v == chunk_model::SCHEMA_MAJOR => {}
        Some(v) => {
            return Err(StoreError::SchemaVersionMismatch { on_disk: v, expected: chunk_model::SCHEMA_MAJOR })
        }
    }
    Ok(())
}
