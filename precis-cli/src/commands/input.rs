//! Loading documents from files or stdin

use anyhow::{bail, Context, Result};
use precis_core::config::ValidationConfig;
use precis_core::pdf::inspect_pdf;
use precis_core::DocumentSource;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Extensions read as plain text rather than PDF
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

/// Read piped stdin; `None` when stdin is a terminal
fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut text = String::new();
    io::stdin()
        .lock()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;
    Ok(Some(text))
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.as_str()))
}

/// Load a document from a path, or from stdin when `input` is "-".
///
/// The returned source carries its quality verdict; callers decide whether a
/// failed check is fatal.
pub fn load_document(input: &str, rules: &ValidationConfig) -> Result<DocumentSource> {
    if input == "-" {
        let Some(text) = read_stdin()? else {
            bail!("No input on stdin. Pipe a document in or pass a file path.");
        };
        return Ok(DocumentSource::from_text("stdin", &text, rules));
    }

    let path = Path::new(input);
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    if is_text_file(path) {
        debug!("Reading {} as plain text", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        return Ok(DocumentSource::from_text(title, &text, rules));
    }

    Ok(inspect_pdf(path, rules)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_file_detection() {
        assert!(is_text_file(Path::new("notes.txt")));
        assert!(is_text_file(Path::new("README.MD")));
        assert!(!is_text_file(Path::new("paper.pdf")));
        assert!(!is_text_file(Path::new("Makefile")));
    }

    #[test]
    fn test_load_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lecture.txt");
        let text = vec!["word"; 600].join(" ");
        std::fs::write(&path, &text).unwrap();

        let source =
            load_document(path.to_str().unwrap(), &ValidationConfig::default()).unwrap();
        assert_eq!(source.title, "lecture");
        assert_eq!(source.word_count, 600);
        assert!(source.meets_minimum_quality());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_document("/nonexistent/paper.pdf", &ValidationConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slides.pptx");
        std::fs::write(&path, "binary").unwrap();

        let err = load_document(path.to_str().unwrap(), &ValidationConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("Only PDF files are supported"));
    }
}
