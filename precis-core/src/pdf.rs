//! Document loading and extraction-quality checks.
//!
//! PDFs are read with lopdf one page at a time. A page that fails to extract
//! counts as empty rather than failing the document. The extracted text is
//! then checked against [`ValidationConfig`] before it is handed to the
//! summarizer, so image-only scans and near-empty files are rejected early.

use crate::config::ValidationConfig;
use crate::tokens::word_count;
use lopdf::{Dictionary, Document};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Separator placed between page texts
const PAGE_SEPARATOR: &str = "\n\n";

/// Errors that can occur while reading a document
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Cannot access file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid PDF file or corrupted content: {0}")]
    OpenError(String),

    #[error(transparent)]
    Rejected(#[from] ValidationError),
}

/// Reasons a document is not fit for summarization
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid file format. Only PDF files are supported. File type detected: {0}")]
    UnsupportedFormat(String),

    #[error("File is empty. Please select a valid PDF file.")]
    EmptyFile,

    #[error("File is too small to contain meaningful content ({0} bytes).")]
    FileTooSmall(u64),

    #[error("File is too large (>{limit_mb}MB). Please select a smaller PDF file.")]
    FileTooLarge { limit_mb: u64 },

    #[error("PDF must have at least {required} page(s). This PDF has {found} page(s).")]
    TooFewPages { required: u32, found: u32 },

    #[error("PDF is password-protected. Please provide an unencrypted PDF file.")]
    Encrypted,

    #[error("No text could be extracted. The file may contain only images or scanned content without OCR.")]
    NoText,

    #[error("Document contains insufficient text for summarization: {found} words (minimum {required}).")]
    TooFewWords { required: usize, found: usize },

    #[error("Too many pages without text ({empty}/{total} pages are empty). This PDF may contain primarily images or scanned content.")]
    TooManyEmptyPages { empty: u32, total: u32 },

    #[error("No pages contain substantial text content. The PDF may contain only headers, footers, or minimal text.")]
    NoSubstantialPages,

    #[error("Average text per page is too low ({0:.0} characters/page). This suggests the PDF contains primarily non-text content.")]
    SparsePages(f64),
}

/// Per-page extraction statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionStats {
    pub total_pages: u32,
    pub pages_with_text: u32,
    /// Pages whose whitespace-normalized text exceeds the substantial threshold
    pub pages_with_substantial_text: u32,
    pub empty_pages: u32,
    pub total_characters: usize,
    pub average_chars_per_page: f64,
}

impl ExtractionStats {
    /// Collect statistics over extracted pages
    pub fn from_pages(pages: &[PdfPage], substantial_chars: usize) -> Self {
        let mut stats = ExtractionStats {
            total_pages: pages.len() as u32,
            ..Default::default()
        };

        for page in pages {
            if page.is_empty() {
                stats.empty_pages += 1;
                continue;
            }
            stats.pages_with_text += 1;
            if normalized_len(&page.text) > substantial_chars {
                stats.pages_with_substantial_text += 1;
            }
            stats.total_characters += page.text.chars().count() + PAGE_SEPARATOR.len();
        }

        if stats.total_pages > 0 {
            stats.average_chars_per_page =
                stats.total_characters as f64 / stats.total_pages as f64;
        }

        stats
    }

    pub fn empty_page_ratio(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.empty_pages as f64 / self.total_pages as f64
    }
}

/// Character count with whitespace runs collapsed to one space
fn normalized_len(text: &str) -> usize {
    let mut len = 0;
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            len += 1;
        }
        len += word.chars().count();
    }
    len
}

/// A single page from a PDF document
#[derive(Debug, Clone, Serialize)]
pub struct PdfPage {
    /// Page index (0-based)
    pub index: u32,
    pub text: String,
}

impl PdfPage {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// PDF metadata
#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: u32,
    pub encrypted: bool,
}

/// A PDF with its extracted pages
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub path: PathBuf,
    pub pages: Vec<PdfPage>,
    pub metadata: PdfMetadata,
}

impl PdfDocument {
    /// Load a PDF and extract the text of every page
    pub fn load(path: &Path) -> Result<Self, PdfError> {
        debug!("Loading PDF from: {}", path.display());

        let doc = Document::load(path).map_err(|e| PdfError::OpenError(e.to_string()))?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let metadata = Self::extract_metadata(&doc, page_numbers.len() as u32);

        debug!(
            "PDF has {} pages (encrypted: {})",
            metadata.page_count, metadata.encrypted
        );

        let pages = if metadata.encrypted {
            Vec::new()
        } else {
            page_numbers
                .iter()
                .map(|&number| Self::extract_page(&doc, number))
                .collect()
        };

        Ok(PdfDocument {
            path: path.to_path_buf(),
            pages,
            metadata,
        })
    }

    fn extract_metadata(doc: &Document, page_count: u32) -> PdfMetadata {
        let info = doc
            .trailer
            .get(b"Info")
            .and_then(|info| info.as_reference())
            .and_then(|id| doc.get_dictionary(id))
            .ok();

        PdfMetadata {
            title: info.and_then(|dict| info_string(dict, b"Title")),
            author: info.and_then(|dict| info_string(dict, b"Author")),
            page_count,
            encrypted: doc.trailer.get(b"Encrypt").is_ok(),
        }
    }

    fn extract_page(doc: &Document, number: u32) -> PdfPage {
        let text = match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not extract text from page {}: {}", number, e);
                String::new()
            }
        };

        PdfPage {
            index: number.saturating_sub(1),
            text,
        }
    }

    /// Text of all non-empty pages, separated by blank lines
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.text.trim())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    pub fn page_count(&self) -> u32 {
        self.metadata.page_count
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let value = dict.get(key).ok()?.as_string().ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Extracted text ready for summarization, with its quality verdict
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSource {
    pub title: String,
    pub author: Option<String>,
    pub text: String,
    pub word_count: usize,
    pub page_count: u32,
    /// Present for PDFs; plain text has no pages
    pub stats: Option<ExtractionStats>,
    #[serde(skip)]
    pub failure: Option<ValidationError>,
}

impl DocumentSource {
    /// Wrap plain text; only the word-count rule applies
    pub fn from_text(title: impl Into<String>, text: &str, rules: &ValidationConfig) -> Self {
        let text = text.trim().to_string();
        let words = word_count(&text);

        let failure = if text.is_empty() {
            Some(ValidationError::NoText)
        } else if words < rules.min_words {
            Some(ValidationError::TooFewWords {
                required: rules.min_words,
                found: words,
            })
        } else {
            None
        };

        Self {
            title: title.into(),
            author: None,
            text,
            word_count: words,
            page_count: 0,
            stats: None,
            failure,
        }
    }

    /// Build from a loaded PDF, applying every extraction rule
    pub fn from_pdf(doc: &PdfDocument, rules: &ValidationConfig) -> Self {
        let text = doc.full_text();
        let stats = ExtractionStats::from_pages(&doc.pages, rules.substantial_page_chars);
        let failure = validate_extraction(&text, &stats, rules).err();

        let title = doc.metadata.title.clone().unwrap_or_else(|| {
            doc.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".to_string())
        });

        Self {
            title,
            author: doc.metadata.author.clone(),
            word_count: word_count(&text),
            text,
            page_count: doc.page_count(),
            stats: Some(stats),
            failure,
        }
    }

    pub fn meets_minimum_quality(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Pass the document through only if it is fit for summarization
    pub fn require_quality(self) -> Result<Self, ValidationError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Check the extension and size before parsing
pub fn check_file(path: &Path, rules: &ValidationConfig) -> Result<u64, PdfError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension != "pdf" {
        let detected = if extension.is_empty() {
            "Unknown".to_string()
        } else {
            format!(".{}", extension)
        };
        return Err(ValidationError::UnsupportedFormat(detected).into());
    }

    let size = std::fs::metadata(path)?.len();
    check_file_size(size, rules)?;
    Ok(size)
}

fn check_file_size(size: u64, rules: &ValidationConfig) -> Result<(), ValidationError> {
    if size == 0 {
        Err(ValidationError::EmptyFile)
    } else if size < rules.min_file_bytes {
        Err(ValidationError::FileTooSmall(size))
    } else if size > rules.max_file_bytes {
        Err(ValidationError::FileTooLarge {
            limit_mb: rules.max_file_bytes / (1024 * 1024),
        })
    } else {
        Ok(())
    }
}

/// Load and check a PDF.
///
/// File and structure problems (format, size, page count, encryption) are
/// returned as errors. Content problems are recorded on the returned source.
pub fn inspect_pdf(path: &Path, rules: &ValidationConfig) -> Result<DocumentSource, PdfError> {
    let size = check_file(path, rules)?;
    debug!("{} is {} bytes", path.display(), size);

    let doc = PdfDocument::load(path)?;
    if doc.page_count() < rules.min_pages {
        return Err(ValidationError::TooFewPages {
            required: rules.min_pages,
            found: doc.page_count(),
        }
        .into());
    }
    if doc.metadata.encrypted {
        return Err(ValidationError::Encrypted.into());
    }

    let source = DocumentSource::from_pdf(&doc, rules);
    if let Some(reason) = source.failure_reason() {
        warn!("{} failed extraction checks: {}", path.display(), reason);
    }
    Ok(source)
}

/// Apply the content rules in order; the first failure wins
pub fn validate_extraction(
    text: &str,
    stats: &ExtractionStats,
    rules: &ValidationConfig,
) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::NoText);
    }

    let words = word_count(text);
    if words < rules.min_words {
        return Err(ValidationError::TooFewWords {
            required: rules.min_words,
            found: words,
        });
    }

    if stats.empty_page_ratio() > rules.max_empty_page_ratio {
        return Err(ValidationError::TooManyEmptyPages {
            empty: stats.empty_pages,
            total: stats.total_pages,
        });
    }

    if stats.total_pages > 0 && stats.pages_with_substantial_text == 0 {
        return Err(ValidationError::NoSubstantialPages);
    }

    if stats.total_pages > 0 && stats.average_chars_per_page < rules.min_avg_chars_per_page {
        return Err(ValidationError::SparsePages(stats.average_chars_per_page));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn page(index: u32, text: &str) -> PdfPage {
        PdfPage {
            index,
            text: text.to_string(),
        }
    }

    fn document(pages: Vec<PdfPage>) -> PdfDocument {
        PdfDocument {
            path: PathBuf::from("/tmp/report.pdf"),
            metadata: PdfMetadata {
                page_count: pages.len() as u32,
                ..Default::default()
            },
            pages,
        }
    }

    #[test]
    fn test_stats_count_empty_and_substantial_pages() {
        let pages = vec![
            page(0, &words(300)),
            page(1, "   \n  "),
            page(2, "Page 3"),
            page(3, &words(300)),
        ];
        let stats = ExtractionStats::from_pages(&pages, 100);

        assert_eq!(stats.total_pages, 4);
        assert_eq!(stats.pages_with_text, 3);
        assert_eq!(stats.empty_pages, 1);
        assert_eq!(stats.pages_with_substantial_text, 2);
        assert_eq!(stats.empty_page_ratio(), 0.25);
        assert!(stats.average_chars_per_page > 200.0);
    }

    #[test]
    fn test_normalized_len_collapses_whitespace() {
        assert_eq!(normalized_len("  a \n\n  b\tc  "), 5);
        assert_eq!(normalized_len(""), 0);
    }

    #[test]
    fn test_healthy_document_passes() {
        let doc = document(vec![page(0, &words(400)), page(1, &words(400))]);
        let source = DocumentSource::from_pdf(&doc, &ValidationConfig::default());

        assert!(source.meets_minimum_quality());
        assert_eq!(source.word_count, 800);
        assert_eq!(source.page_count, 2);
        assert_eq!(source.title, "report");
        assert!(source.text.contains("\n\n"));
    }

    #[test]
    fn test_image_only_document_has_no_text() {
        let doc = document(vec![page(0, ""), page(1, " ")]);
        let source = DocumentSource::from_pdf(&doc, &ValidationConfig::default());

        assert_eq!(source.failure, Some(ValidationError::NoText));
        assert!(source
            .failure_reason()
            .unwrap()
            .contains("No text could be extracted"));
    }

    #[test]
    fn test_short_document_fails_word_count() {
        let doc = document(vec![page(0, &words(120))]);
        let source = DocumentSource::from_pdf(&doc, &ValidationConfig::default());

        assert_eq!(
            source.failure,
            Some(ValidationError::TooFewWords {
                required: 500,
                found: 120
            })
        );
        assert!(source.require_quality().is_err());
    }

    #[test]
    fn test_mostly_empty_pages_are_rejected() {
        let mut pages = vec![page(0, &words(600))];
        pages.extend((1..4).map(|i| page(i, "")));
        let source = DocumentSource::from_pdf(&document(pages), &ValidationConfig::default());

        assert_eq!(
            source.failure,
            Some(ValidationError::TooManyEmptyPages { empty: 3, total: 4 })
        );
    }

    #[test]
    fn test_rule_order_and_thresholds() {
        let rules = ValidationConfig::default();
        let text = words(600);

        let sparse = ExtractionStats {
            total_pages: 10,
            pages_with_text: 10,
            pages_with_substantial_text: 0,
            empty_pages: 0,
            total_characters: 1500,
            average_chars_per_page: 150.0,
        };
        assert_eq!(
            validate_extraction(&text, &sparse, &rules),
            Err(ValidationError::NoSubstantialPages)
        );

        let thin = ExtractionStats {
            pages_with_substantial_text: 2,
            ..sparse.clone()
        };
        assert_eq!(
            validate_extraction(&text, &thin, &rules),
            Err(ValidationError::SparsePages(150.0))
        );

        let exactly_at_ratio = ExtractionStats {
            empty_pages: 7,
            pages_with_substantial_text: 3,
            average_chars_per_page: 400.0,
            ..sparse
        };
        assert_eq!(validate_extraction(&text, &exactly_at_ratio, &rules), Ok(()));
    }

    #[test]
    fn test_plain_text_only_checks_words() {
        let rules = ValidationConfig::default();

        let ok = DocumentSource::from_text("notes", &words(500), &rules);
        assert!(ok.meets_minimum_quality());
        assert!(ok.stats.is_none());

        let short = DocumentSource::from_text("notes", "just a few words", &rules);
        assert!(matches!(
            short.failure,
            Some(ValidationError::TooFewWords { found: 4, .. })
        ));

        let blank = DocumentSource::from_text("notes", "  \n ", &rules);
        assert_eq!(blank.failure, Some(ValidationError::NoText));
    }

    #[test]
    fn test_check_file_rejects_other_extensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.docx");
        std::fs::write(&path, "content").unwrap();

        let err = check_file(&path, &ValidationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PdfError::Rejected(ValidationError::UnsupportedFormat(ref ext)) if ext == ".docx"
        ));

        let bare = dir.path().join("README");
        let err = check_file(&bare, &ValidationConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Unknown"));
    }

    #[test]
    fn test_check_file_size_limits() {
        let dir = TempDir::new().unwrap();
        let rules = ValidationConfig::default();

        let empty = dir.path().join("empty.pdf");
        std::fs::File::create(&empty).unwrap();
        assert!(matches!(
            check_file(&empty, &rules),
            Err(PdfError::Rejected(ValidationError::EmptyFile))
        ));

        let tiny = dir.path().join("tiny.PDF");
        std::fs::write(&tiny, b"%PDF-1.4").unwrap();
        assert!(matches!(
            check_file(&tiny, &rules),
            Err(PdfError::Rejected(ValidationError::FileTooSmall(8)))
        ));

        let capped = ValidationConfig {
            max_file_bytes: 2048,
            ..ValidationConfig::default()
        };
        let big = dir.path().join("big.pdf");
        let mut file = std::fs::File::create(&big).unwrap();
        file.write_all(&[b'x'; 4096]).unwrap();
        assert!(matches!(
            check_file(&big, &capped),
            Err(PdfError::Rejected(ValidationError::FileTooLarge { .. }))
        ));

        let missing = dir.path().join("missing.pdf");
        assert!(matches!(check_file(&missing, &rules), Err(PdfError::IoError(_))));
    }

    #[test]
    fn test_corrupt_pdf_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.pdf");
        std::fs::write(&path, vec![b'#'; 2048]).unwrap();

        let err = inspect_pdf(&path, &ValidationConfig::default()).unwrap_err();
        assert!(matches!(err, PdfError::OpenError(_)));
    }
}
