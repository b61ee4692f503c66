//! Text extraction for uploaded documents.
//!
//! Upload handling dispatches on a closed set of document kinds rather than
//! branching on raw MIME strings; anything outside the set is rejected with
//! an explicit error before the generation service is involved.

use thiserror::Error;
use tracing::debug;

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Errors that can occur while extracting document text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file type is not one we can extract text from.
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    /// The file contained no extractable text.
    #[error("file content is empty or unreadable")]
    Empty,

    /// PDF parsing failed.
    #[error("failed to extract PDF text: {0}")]
    Pdf(String),
}

/// Supported document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
    Unsupported,
}

impl DocumentKind {
    /// Classify an upload from its declared content type and filename.
    ///
    /// The declared content type wins when present; the filename extension is
    /// the fallback for clients that upload without one.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Self {
        if let Some(content_type) = content_type {
            return Self::from_mime(content_type);
        }

        let guessed = mime_guess::from_path(filename).first_raw();
        match guessed {
            Some(mime) => Self::from_mime(mime),
            None => DocumentKind::Unsupported,
        }
    }

    fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        if essence == "application/pdf" {
            DocumentKind::Pdf
        } else if essence.starts_with("text/") || essence == "application/json" {
            DocumentKind::PlainText
        } else {
            DocumentKind::Unsupported
        }
    }
}

/// Extract the text of an uploaded document.
///
/// Returns `ExtractError::Empty` when the extracted text is blank, so
/// callers never forward an empty document upstream.
pub fn extract_text(filename: &str, content_type: Option<&str>, data: &[u8]) -> ExtractResult<String> {
    let kind = DocumentKind::detect(filename, content_type);
    debug!(filename, ?kind, bytes = data.len(), "extracting document text");

    let text = match kind {
        DocumentKind::PlainText => String::from_utf8_lossy(data).into_owned(),
        DocumentKind::Pdf => {
            pdf_extract::extract_text_from_mem(data).map_err(|e| ExtractError::Pdf(e.to_string()))?
        }
        DocumentKind::Unsupported => {
            let declared = content_type.unwrap_or("unknown");
            return Err(ExtractError::Unsupported(declared.to_string()));
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }

    Ok(text)
}
