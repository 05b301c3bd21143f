//! Plain-text extraction for the supported document formats.
//!
//! | Extension | Handling |
//! |-----------|----------|
//! | `.txt`, `.md` | read as UTF-8 |
//! | `.pdf` | per-page text via `pdf-extract`, blank pages skipped |
//! | `.docx` | `<w:t>` runs of each `<w:p>` paragraph, blank paragraphs skipped |
//!
//! Any other extension yields `Ok(None)` so the caller can warn and move on.
//! Extraction failures never panic; they come back as [`ExtractError`] and the
//! ingestion run skips the file.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Format of a file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

/// Loads the text of one file.
///
/// Returns `Ok(None)` for unsupported extensions.
pub fn load_document(path: &Path) -> Result<Option<String>, ExtractError> {
    let Some(kind) = DocumentKind::from_path(path) else {
        return Ok(None);
    };
    let text = match kind {
        DocumentKind::Text => std::fs::read_to_string(path)?,
        DocumentKind::Pdf => extract_pdf(&std::fs::read(path)?)?,
        DocumentKind::Docx => extract_docx(&std::fs::read(path)?)?,
    };
    Ok(Some(text))
}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed fonts and streams
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser aborted on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let pages: Vec<String> = pages
        .into_iter()
        .filter(|page| !page.trim().is_empty())
        .collect();
    if pages.is_empty() {
        return Err(ExtractError::Pdf("no page contains extractable text".to_string()));
    }
    Ok(pages.join("\n"))
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    let paragraphs = extract_paragraphs(&doc_xml)?;
    let text = paragraphs.join("\n");
    if text.trim().is_empty() {
        return Err(ExtractError::Docx("document contains no text".to_string()));
    }
    Ok(text)
}

/// Collects the concatenated `<w:t>` text of every non-empty `<w:p>`.
fn extract_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if !current.is_empty() => current.push('\t'),
                b"br" if !current.is_empty() => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_path(Path::new("a.TXT")), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_path(Path::new("a.pdf")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("a.docx")), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_path(Path::new("a.xlsx")), None);
        assert_eq!(DocumentKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn docx_paragraphs_are_joined_by_newline() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>\
             <w:p></w:p>\
             <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>",
        );
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "Hello world\nSecond & last");
    }

    #[test]
    fn blank_docx_is_an_error() {
        let bytes = docx_with_body("<w:p><w:r><w:t>   </w:t></w:r></w:p>");
        assert!(matches!(extract_docx(&bytes), Err(ExtractError::Docx(_))));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn unsupported_extension_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        std::fs::write(&path, b"whatever").unwrap();
        assert!(load_document(&path).unwrap().is_none());
    }

    #[test]
    fn text_file_read_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\n\nSome text.").unwrap();
        assert_eq!(
            load_document(&path).unwrap().as_deref(),
            Some("# Notes\n\nSome text.")
        );
    }
}
