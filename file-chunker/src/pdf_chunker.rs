use crate::reader_pdf::{default_backend, read_pdf_to_blocks, PdfBackend};
use crate::text_segmenter::TextChunkParams;
use crate::unified_blocks::UnifiedBlock;
use chunk_model::{ChunkId, ChunkRecord, DocumentId, FileRecord, SCHEMA_MAJOR};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct PdfChunkParams {
    /// Prefer chunk lengths >= this many characters
    pub min_chars: usize,
    /// Prefer chunk lengths around this many characters
    pub max_chars: usize,
    /// Hard cap: do not exceed this many characters per chunk when possible
    pub cap_chars: usize,
}

impl Default for PdfChunkParams {
    fn default() -> Self {
        Self { min_chars: 400, max_chars: 600, cap_chars: 800 }
    }
}

impl From<PdfChunkParams> for TextChunkParams {
    fn from(p: PdfChunkParams) -> Self {
        TextChunkParams {
            min_chars: p.min_chars,
            max_chars: p.max_chars,
            cap_chars: p.cap_chars,
            penalize_short_line: true,
            penalize_page_boundary_no_newline: true,
        }
    }
}

/// Segment already-extracted PDF blocks using PDF-tuned defaults (penalize
/// short trailing lines and page-boundary cuts without a newline).
pub fn chunk_pdf_blocks_to_segments(blocks: &[UnifiedBlock], params: &PdfChunkParams) -> Vec<(String, Option<u32>, Option<u32>)> {
    let tparams: TextChunkParams = (*params).into();
    crate::text_segmenter::chunk_blocks_to_segments(blocks, &tparams)
}

/// Segment PDF blocks using caller-supplied `TextChunkParams` (used when a
/// single `CHUNK_MAX_TOKENS`-derived parameter set must apply uniformly
/// across extractors).
pub fn chunk_pdf_blocks_to_segments_with_text_params(
    blocks: &[UnifiedBlock],
    params: &TextChunkParams,
) -> Vec<(String, Option<u32>, Option<u32>)> {
    crate::text_segmenter::chunk_blocks_to_segments(blocks, params)
}

pub fn chunk_pdf_blocks_to_text(blocks: &[UnifiedBlock], params: &PdfChunkParams) -> Vec<String> {
    chunk_pdf_blocks_to_segments(blocks, params).into_iter().map(|(t, _, _)| t).collect()
}

/// High-level: read PDF -> chunk -> return FileRecord and ChunkRecords.
pub fn chunk_pdf_file_with_file_record(path: &str, params: &PdfChunkParams) -> (FileRecord, Vec<ChunkRecord>) {
    let blocks = read_pdf_to_blocks(path);
    let segs = chunk_pdf_blocks_to_segments(&blocks, params);

    let backend = match default_backend() {
        PdfBackend::Pdfium => "pdfium",
        PdfBackend::PureRust => "pure-pdf",
        PdfBackend::Stub => "stub.pdf",
    };

    let doc_id = DocumentId::from_path(path);
    let file = FileRecord {
        schema_version: SCHEMA_MAJOR,
        doc_id: doc_id.clone(),
        doc_revision: Some(1),
        source_uri: path.to_string(),
        source_mime: "application/pdf".into(),
        file_size_bytes: None,
        content_sha256: None,
        page_count: segs.iter().filter_map(|(_, _, pe)| *pe).max(),
        extracted_at: String::new(),
        created_at_meta: None,
        updated_at_meta: None,
        title_guess: None,
        author_guess: None,
        dominant_lang: None,
        tags: Vec::new(),
        ingest_tool: Some("file-chunker".into()),
        ingest_tool_version: Some(env!("CARGO_PKG_VERSION").into()),
        reader_backend: Some(backend.into()),
        ocr_used: None,
        ocr_langs: Vec::new(),
        chunk_count: Some(segs.len() as u32),
        total_tokens: None,
        meta: BTreeMap::new(),
        extra: BTreeMap::new(),
    };

    let chunks: Vec<ChunkRecord> = segs
        .into_iter()
        .enumerate()
        .map(|(i, (text, pstart, pend))| ChunkRecord {
            schema_version: SCHEMA_MAJOR,
            doc_id: doc_id.clone(),
            chunk_id: ChunkId::new(&doc_id, i as u32),
            chunk_index: i as u32,
            source_uri: path.to_string(),
            source_mime: "application/pdf".into(),
            extracted_at: String::new(),
            page_start: pstart,
            page_end: pend,
            text,
            section_path: None,
            meta: BTreeMap::new(),
            extra: BTreeMap::new(),
        })
        .collect();

    (file, chunks)
}
