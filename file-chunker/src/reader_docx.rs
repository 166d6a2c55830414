use crate::unified_blocks::{BlockKind, UnifiedBlock};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;

fn local_name(q: &[u8]) -> &[u8] {
    match q.iter().position(|&b| b == b':') {
        Some(i) => &q[i + 1..],
        None => q,
    }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false).flatten() {
        if local_name(a.key.as_ref()) == key_local {
            return Some(String::from_utf8_lossy(&a.value).into_owned());
        }
    }
    None
}

/// Heading level implied by a Word paragraph style id, e.g. "Heading1" -> 1,
/// "Title" -> 1. Returns `None` for body-text styles.
fn heading_level_from_style(style: &str) -> Option<u32> {
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some(1);
    }
    let stripped = lower.strip_prefix("heading")?;
    stripped.trim().parse::<u32>().ok()
}

/// Read a .docx (OOXML WordprocessingML) file and convert its body into
/// `UnifiedBlock`s.
///
/// - Paragraphs styled `HeadingN` or `Title` become `Heading` blocks with
///   `heading_level` set.
/// - Other paragraphs become `Paragraph` blocks, runs joined without extra
///   whitespace (Word splits a single sentence across many `w:r` runs).
/// - Tables are flattened into tab-separated rows wrapped in a
///   `<table delim="tsv" cell-nl="U+2028">...</table>` block, matching the
///   in-cell-newline convention used by the other office readers.
///
/// DOCX has no native page concept; `page_start`/`page_end` are left unset.
pub fn read_docx_to_blocks(path: &str) -> Vec<UnifiedBlock> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => {
            return vec![UnifiedBlock::new(BlockKind::Paragraph, "(error) failed to open DOCX", 0, path, "docx")]
        }
    };
    let mut zip = match zip::ZipArchive::new(file) {
        Ok(z) => z,
        Err(_) => {
            return vec![UnifiedBlock::new(
                BlockKind::Paragraph,
                "(error) not a valid .docx (zip) file",
                0,
                path,
                "docx",
            )]
        }
    };

    let mut xml = String::new();
    match zip.by_name("word/document.xml") {
        Ok(mut f) => {
            let mut bytes = Vec::new();
            if f.read_to_end(&mut bytes).is_err() {
                return vec![UnifiedBlock::new(BlockKind::Paragraph, "(error) failed to read document.xml", 0, path, "docx")];
            }
            xml = String::from_utf8_lossy(&bytes).into_owned();
        }
        Err(_) => {
            return vec![UnifiedBlock::new(BlockKind::Paragraph, "(error) missing word/document.xml", 0, path, "docx")]
        }
    }
    if xml.is_empty() {
        return vec![UnifiedBlock::new(BlockKind::Paragraph, "(empty document)", 0, path, "docx")];
    }

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut blocks: Vec<UnifiedBlock> = Vec::new();
    let mut order = 0u32;

    let mut in_p = false;
    let mut para_style: Option<String> = None;
    let mut in_r_t = false;
    let mut cur_text = String::new();

    let mut in_tbl = false;
    let mut in_tr = false;
    let mut in_tc = false;
    let mut cell_text = String::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut table_rows: Vec<String> = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                match local_name(e.name().as_ref()) {
                    b"p" => {
                        in_p = true;
                        para_style = None;
                        cur_text.clear();
                    }
                    b"pStyle" => {
                        if in_p {
                            para_style = attr_val(&e, b"val");
                        }
                    }
                    b"t" => {
                        in_r_t = true;
                    }
                    b"br" | b"cr" => {
                        if in_p {
                            cur_text.push('\n');
                        }
                    }
                    b"tbl" => {
                        in_tbl = true;
                        table_rows.clear();
                    }
                    b"tr" => {
                        if in_tbl {
                            in_tr = true;
                            row_cells.clear();
                        }
                    }
                    b"tc" => {
                        if in_tr {
                            in_tc = true;
                            cell_text.clear();
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if in_r_t {
                    if let Ok(s) = t.unescape() {
                        if in_tc {
                            cell_text.push_str(&s);
                        } else if in_p {
                            cur_text.push_str(&s);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                match local_name(e.name().as_ref()) {
                    b"t" => in_r_t = false,
                    b"tc" => {
                        if in_tc {
                            in_tc = false;
                            let cell = cell_text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\u{2028}");
                            row_cells.push(cell);
                        }
                    }
                    b"tr" => {
                        if in_tr {
                            in_tr = false;
                            table_rows.push(row_cells.join("\t"));
                        }
                    }
                    b"tbl" => {
                        if in_tbl {
                            in_tbl = false;
                            if !table_rows.is_empty() {
                                let content = table_rows.join("\n");
                                let wrapped = format!("<table delim=\"tsv\" cell-nl=\"U+2028\">\n{}\n</table>\n", content);
                                let mut b = UnifiedBlock::new(BlockKind::Table, wrapped, order, path, "docx");
                                b.attrs.insert("is_table".to_string(), "true".to_string());
                                b.attrs.insert("table_cell_nl".to_string(), "U+2028".to_string());
                                blocks.push(b);
                                order += 1;
                            }
                        }
                    }
                    b"p" => {
                        if in_p {
                            in_p = false;
                            let text = cur_text.trim().to_string();
                            if !text.is_empty() {
                                let level = para_style.as_deref().and_then(heading_level_from_style);
                                let b = if let Some(lvl) = level {
                                    let mut hb = UnifiedBlock::new(BlockKind::Heading, format!("{}\n", text), order, path, "docx");
                                    hb.heading_level = Some(lvl);
                                    hb
                                } else {
                                    UnifiedBlock::new(BlockKind::Paragraph, format!("{}\n", text), order, path, "docx")
                                };
                                blocks.push(b);
                                order += 1;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    if blocks.is_empty() {
        blocks.push(UnifiedBlock::new(BlockKind::Paragraph, String::new(), 0, path, "docx"));
    }
    blocks
}
