//! Extractor registry: maps a file extension to the `Extractor` that knows
//! how to turn that file into plain text. Extractors themselves are thin
//! glue over the `reader_*` modules; the interesting logic (chunking) lives
//! in `text_segmenter` and is extractor-agnostic.
//!
//! New file types are supported by registering another `Extractor`, not by
//! growing a match statement in the pipeline coordinator.

use std::collections::HashMap;
use std::path::Path;

use crate::unified_blocks::UnifiedBlock;
use crate::{reader_docx, reader_excel, reader_pdf, reader_pptx, reader_txt};

/// One page (or page-like unit, e.g. a slide) of extracted plain text.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub text: String,
    pub page_no: Option<u32>,
}

/// Result of running an extractor over a single file.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub pages: Vec<ExtractedPage>,
    pub method: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn failed(method: impl Into<String>, error: impl Into<String>) -> Self {
        Self { pages: Vec::new(), method: method.into(), success: false, error: Some(error.into()) }
    }

    pub fn ok(method: impl Into<String>, pages: Vec<ExtractedPage>) -> Self {
        Self { pages, method: method.into(), success: true, error: None }
    }

    pub fn blocks(&self) -> Vec<UnifiedBlock> {
        use crate::unified_blocks::BlockKind;
        self.pages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut b = UnifiedBlock::new(BlockKind::Paragraph, p.text.clone(), i as u32, "", &self.method);
                b.page_start = p.page_no;
                b.page_end = p.page_no;
                b
            })
            .collect()
    }
}

/// An extractor maps one file extension family to an `ExtractionResult`.
/// Implementations must never panic; a file that cannot be parsed is a
/// `success: false` result, not a process abort.
pub trait Extractor: Send + Sync {
    fn method_name(&self) -> &'static str;
    fn extract(&self, path: &str) -> ExtractionResult;
}

fn group_blocks_into_pages(blocks: &[UnifiedBlock]) -> Vec<ExtractedPage> {
    let mut pages: Vec<ExtractedPage> = Vec::new();
    for b in blocks {
        match pages.last_mut() {
            Some(last) if last.page_no == b.page_start => {
                if !last.text.is_empty() && !last.text.ends_with('\n') {
                    last.text.push('\n');
                }
                last.text.push_str(&b.text);
            }
            _ => pages.push(ExtractedPage { text: b.text.clone(), page_no: b.page_start }),
        }
    }
    pages
}

pub struct PdfExtractor;
impl Extractor for PdfExtractor {
    fn method_name(&self) -> &'static str {
        "pdf"
    }
    fn extract(&self, path: &str) -> ExtractionResult {
        let blocks = reader_pdf::read_pdf_to_blocks(path);
        ExtractionResult::ok(self.method_name(), group_blocks_into_pages(&blocks))
    }
}

pub struct DocxExtractor;
impl Extractor for DocxExtractor {
    fn method_name(&self) -> &'static str {
        "docx"
    }
    fn extract(&self, path: &str) -> ExtractionResult {
        let blocks = reader_docx::read_docx_to_blocks(path);
        ExtractionResult::ok(self.method_name(), group_blocks_into_pages(&blocks))
    }
}

pub struct ExcelExtractor;
impl Extractor for ExcelExtractor {
    fn method_name(&self) -> &'static str {
        "excel"
    }
    fn extract(&self, path: &str) -> ExtractionResult {
        let blocks = reader_excel::read_excel_to_blocks(path);
        ExtractionResult::ok(self.method_name(), group_blocks_into_pages(&blocks))
    }
}

pub struct PptxExtractor;
impl Extractor for PptxExtractor {
    fn method_name(&self) -> &'static str {
        "pptx"
    }
    fn extract(&self, path: &str) -> ExtractionResult {
        let blocks = reader_pptx::read_pptx_to_blocks(path);
        ExtractionResult::ok(self.method_name(), group_blocks_into_pages(&blocks))
    }
}

pub struct TextExtractor;
impl Extractor for TextExtractor {
    fn method_name(&self) -> &'static str {
        "txt"
    }
    fn extract(&self, path: &str) -> ExtractionResult {
        let blocks = reader_txt::read_txt_to_blocks(path);
        ExtractionResult::ok(self.method_name(), group_blocks_into_pages(&blocks))
    }
}

/// Maps a lowercased file extension (without the leading dot) to the
/// `Extractor` responsible for it. `for_path` additionally falls back to a
/// NUL-byte probe for extension-less files, matching `is_text_like`.
pub struct ExtractorRegistry {
    by_ext: HashMap<String, Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self { by_ext: HashMap::new() }
    }

    pub fn register(&mut self, ext: &str, extractor: Box<dyn Extractor>) {
        self.by_ext.insert(ext.to_ascii_lowercase(), extractor);
    }

    pub fn with_default_extractors() -> Self {
        let mut reg = Self::new();
        reg.register("pdf", Box::new(PdfExtractor));
        reg.register("docx", Box::new(DocxExtractor));
        reg.register("pptx", Box::new(PptxExtractor));
        for ext in ["xlsx", "xls", "ods"] {
            reg.register(ext, Box::new(ExcelExtractor));
        }
        for ext in [
            "txt", "md", "markdown", "csv", "tsv", "log", "json", "yaml", "yml", "ini", "toml",
            "cfg", "conf", "rst", "tex", "srt", "properties",
        ] {
            reg.register(ext, Box::new(TextExtractor));
        }
        reg
    }

    /// Resolve the extractor for `path`, falling back to `TextExtractor` for
    /// extension-less files that probe as text (no NUL bytes in the first
    /// 2KiB), and `None` for anything else.
    pub fn for_path(&self, path: &str) -> Option<&dyn Extractor> {
        let ext = Path::new(path).extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        if let Some(ext) = ext {
            if let Some(e) = self.by_ext.get(&ext) {
                return Some(e.as_ref());
            }
            return None;
        }
        if crate::is_text_like(path) {
            return self.by_ext.get("txt").map(|e| e.as_ref());
        }
        None
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_default_extractors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dispatches_by_extension() {
        let reg = ExtractorRegistry::with_default_extractors();
        assert_eq!(reg.for_path("a.pdf").unwrap().method_name(), "pdf");
        assert_eq!(reg.for_path("a.docx").unwrap().method_name(), "docx");
        assert_eq!(reg.for_path("a.xlsx").unwrap().method_name(), "excel");
        assert_eq!(reg.for_path("a.pptx").unwrap().method_name(), "pptx");
        assert_eq!(reg.for_path("a.md").unwrap().method_name(), "txt");
        assert!(reg.for_path("a.unknownext").is_none());
    }
}
