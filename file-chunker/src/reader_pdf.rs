use crate::unified_blocks::{BlockKind, UnifiedBlock};

/// Which concrete PDF backend `read_pdf_to_blocks` will dispatch to, given
/// the crate's enabled features. Surfaced on `FileRecord.reader_backend` so
/// callers can tell a heuristically-segmented pdfium extraction apart from
/// a page-per-block pure-Rust fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfBackend {
    Pdfium,
    PureRust,
    Stub,
}

/// The backend `read_pdf_to_blocks` will use, in priority order: `pdfium`
/// feature (best text-layout fidelity) > `pure-pdf` feature (lopdf, no
/// external binary) > stub placeholder.
pub fn default_backend() -> PdfBackend {
    #[cfg(feature = "pdfium")]
    {
        return PdfBackend::Pdfium;
    }
    #[cfg(all(not(feature = "pdfium"), feature = "pure-pdf"))]
    {
        return PdfBackend::PureRust;
    }
    #[cfg(not(any(feature = "pdfium", feature = "pure-pdf")))]
    {
        PdfBackend::Stub
    }
}

/// Read a PDF file into `UnifiedBlock`s using whichever backend this crate
/// was built with. Never panics: a missing backend or a read failure yields
/// a single placeholder block rather than propagating an error, matching
/// the extractor contract (`extract` must never panic).
pub fn read_pdf_to_blocks(path: &str) -> Vec<UnifiedBlock> {
    match default_backend() {
        PdfBackend::Pdfium => {
            #[cfg(feature = "pdfium")]
            {
                crate::reader_pdf_pdfium::read_pdf_to_blocks_pdfium(path)
            }
            #[cfg(not(feature = "pdfium"))]
            {
                unreachable!("default_backend() selected Pdfium without the feature enabled")
            }
        }
        PdfBackend::PureRust => {
            #[cfg(feature = "pure-pdf")]
            {
                crate::reader_pdf_pure::read_pdf_to_blocks_pure(path)
            }
            #[cfg(not(feature = "pure-pdf"))]
            {
                unreachable!("default_backend() selected PureRust without the feature enabled")
            }
        }
        PdfBackend::Stub => {
            vec![UnifiedBlock::new(
                BlockKind::Paragraph,
                "(stub) no PDF backend compiled in; enable the `pdfium` or `pure-pdf` feature",
                0,
                path,
                "stub.pdf",
            )]
        }
    }
}
