//! Parsers (§4.2): convert a file to plain text per MIME/extension.

use std::fs;
use std::path::Path;

use crate::error::EngineError;

pub struct ParsedDocument {
    pub text: String,
    pub mime: String,
}

/// Dispatches on the file's extension. `.txt`/`.md` are UTF-8 decoded with
/// lossy replacement of invalid sequences; `.pdf` is extracted page by page
/// and pages are joined with a blank line. Any other extension is
/// `UnsupportedFormat`. A result that is empty after trimming is
/// `EmptyDocument` rather than a successful empty parse.
pub fn parse_file(path: &Path) -> Result<ParsedDocument, EngineError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let text = match ext.as_str() {
        "txt" | "md" => {
            let bytes = fs::read(path).map_err(|e| EngineError::ParseFailed(e.to_string()))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        "pdf" => parse_pdf(path)?,
        other => return Err(EngineError::UnsupportedFormat(other.to_string())),
    };

    if text.trim().is_empty() {
        return Err(EngineError::EmptyDocument(path.display().to_string()));
    }

    Ok(ParsedDocument { text, mime })
}

fn parse_pdf(path: &Path) -> Result<String, EngineError> {
    let doc = lopdf::Document::load(path).map_err(|e| EngineError::ParseFailed(e.to_string()))?;

    let mut pages: Vec<String> = Vec::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                tracing::debug!(page = page_num, error = %e, "failed to extract page, skipping");
            }
        }
    }

    Ok(pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "hello world");
        let doc = parse_file(&path).unwrap();
        assert_eq!(doc.text, "hello world");
    }

    #[test]
    fn parses_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.md", "# Title\n\nbody");
        let doc = parse_file(&path).unwrap();
        assert!(doc.text.contains("Title"));
    }

    #[test]
    fn empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.txt", "   \n  ");
        assert!(matches!(parse_file(&path), Err(EngineError::EmptyDocument(_))));
    }

    #[test]
    fn unsupported_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", "data");
        assert!(matches!(parse_file(&path), Err(EngineError::UnsupportedFormat(_))));
    }
}
