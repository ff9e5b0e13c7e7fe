//! Text extraction for uploaded documents.
//!
//! Turns files into [`Document`]s: PDF via `pdf-extract`, plain text and
//! Markdown read as UTF-8. Directories are walked recursively and
//! unsupported files are skipped.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use docqa_core::models::Document;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

/// Extraction error. Never panics; callers decide whether to skip the file.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Encoding(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Encoding(e) => write!(f, "text is not valid UTF-8: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Content type for a path, by extension. `None` for unsupported files.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" | "text" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

/// Extract plain text from `bytes` of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        MIME_TEXT | MIME_MARKDOWN => String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractError::Encoding(e.to_string())),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Read one file into a [`Document`] identified by its file name.
pub fn extract_document(path: &Path) -> Result<Document> {
    let content_type = content_type_for(path)
        .ok_or_else(|| ExtractError::UnsupportedContentType(path.display().to_string()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = extract_text(&bytes, content_type)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;

    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!(document = %id, chars = text.chars().count(), "extracted");
    Ok(Document::new(id, text))
}

/// Expand `paths` (files or directories) into supported files, sorted so
/// that document order is stable across runs.
pub fn discover_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry =
                    entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if entry.file_type().is_file() && content_type_for(entry.path()).is_some() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Extract every supported file under `paths`.
///
/// Files that fail extraction are logged and skipped. It is an error if
/// nothing yields any text.
pub fn collect_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for file in discover_files(paths)? {
        match extract_document(&file) {
            Ok(doc) if doc.text.trim().is_empty() => {
                warn!(file = %file.display(), "no text extracted; skipped");
            }
            Ok(doc) => documents.push(doc),
            Err(e) => warn!(file = %file.display(), error = %format!("{e:#}"), "skipped"),
        }
    }
    if documents.is_empty() {
        bail!("No text extracted.");
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_utf8_returns_error() {
        let err = extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("a/Notes.PDF")), Some(MIME_PDF));
        assert_eq!(content_type_for(Path::new("readme.md")), Some(MIME_MARKDOWN));
        assert_eq!(content_type_for(Path::new("image.png")), None);
        assert_eq!(content_type_for(Path::new("Makefile")), None);
    }

    #[test]
    fn collects_directory_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "second").unwrap();
        std::fs::write(tmp.path().join("a.md"), "# first").unwrap();
        std::fs::write(tmp.path().join("empty.txt"), "   ").unwrap();
        std::fs::write(tmp.path().join("skip.bin"), [0u8, 1, 2]).unwrap();

        let docs = collect_documents(&[tmp.path().to_path_buf()]).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "b.txt"]);
        assert_eq!(docs[1].text, "second");
    }

    #[test]
    fn nothing_extracted_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("empty.txt"), "").unwrap();
        let err = collect_documents(&[tmp.path().to_path_buf()]).unwrap_err();
        assert_eq!(err.to_string(), "No text extracted.");
    }
}
