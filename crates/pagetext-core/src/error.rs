use std::fmt;

use thiserror::Error;

use crate::Stage;

/// Closed set of failure kinds surfaced to callers and to the messenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EngineUnavailable,
    InvalidInput,
    FileReadError,
    PasswordProtected,
    InvalidDocument,
    DocumentUnreadable,
    PageExtractionError,
    UnknownError,
    /// The caller cancelled the extraction through its token.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EngineUnavailable => "engine_unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::FileReadError => "file_read_error",
            ErrorKind::PasswordProtected => "password_protected",
            ErrorKind::InvalidDocument => "invalid_document",
            ErrorKind::DocumentUnreadable => "document_unreadable",
            ErrorKind::PageExtractionError => "page_extraction_error",
            ErrorKind::UnknownError => "unknown_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Message shown to the user for this kind.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::EngineUnavailable => {
                "Document engine worker could not be configured. Please ensure the engine is \
                 loaded and check your connection if the worker is fetched remotely."
            }
            ErrorKind::InvalidInput => "Invalid input: expected a file for text extraction.",
            ErrorKind::FileReadError => {
                "Error reading the file. Please ensure the file is selected correctly and not damaged."
            }
            ErrorKind::PasswordProtected => {
                "The document is encrypted and requires a password. Password-protected documents \
                 cannot be processed."
            }
            ErrorKind::InvalidDocument => "The file is not a valid document or it is corrupted.",
            ErrorKind::DocumentUnreadable => "The document could not be found or is unreadable.",
            ErrorKind::PageExtractionError => {
                "Could not fully extract text from the document. It might contain non-standard \
                 fonts, be partially corrupted, or be image-based."
            }
            ErrorKind::UnknownError => {
                "Could not read text from the document. The file might be corrupted, or an \
                 unknown error occurred."
            }
            ErrorKind::Cancelled => "Text extraction was cancelled.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified extraction failure.
///
/// `Display` yields the user-facing message; `detail` carries the underlying
/// cause for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtractError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
    pub detail: Option<String>,
    /// For page failures: how many pages had been extracted when the failure hit.
    pub pages_completed: Option<usize>,
    /// Set when releasing the document also failed after this error.
    pub release_error: Option<String>,
}

impl ExtractError {
    pub fn new(kind: ErrorKind, stage: Stage) -> Self {
        Self {
            kind,
            stage,
            message: kind.user_message().to_string(),
            detail: None,
            pages_completed: None,
            release_error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Record partial progress and mention it in the user-facing message.
    pub fn with_pages_completed(mut self, completed: usize, total: usize) -> Self {
        self.pages_completed = Some(completed);
        if completed > 0 {
            self.message = format!(
                "{} ({} of {} pages were extracted before the failure.)",
                self.message, completed, total
            );
        }
        self
    }

    pub fn with_release_error(mut self, error: impl Into<String>) -> Self {
        self.release_error = Some(error.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_user_message() {
        let err = ExtractError::new(ErrorKind::InvalidDocument, Stage::OpeningDocument)
            .with_detail("format error: no objects found");
        assert_eq!(err.to_string(), ErrorKind::InvalidDocument.user_message());
        assert_eq!(err.detail.as_deref(), Some("format error: no objects found"));
    }

    #[test]
    fn partial_progress_is_mentioned() {
        let err = ExtractError::new(ErrorKind::PageExtractionError, Stage::FetchingPages)
            .with_pages_completed(2, 5);
        assert_eq!(err.pages_completed, Some(2));
        assert!(err.message.contains("2 of 5 pages"));
    }

    #[test]
    fn zero_progress_keeps_plain_message() {
        let err = ExtractError::new(ErrorKind::PageExtractionError, Stage::FetchingPages)
            .with_pages_completed(0, 3);
        assert_eq!(err.pages_completed, Some(0));
        assert_eq!(err.message, ErrorKind::PageExtractionError.user_message());
    }
}
