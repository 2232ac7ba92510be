//! Mapping engine failures onto [`ErrorKind`].

use crate::engine::EngineError;
use crate::error::ErrorKind;

/// Classify a document-open failure by its engine code.
pub fn classify_open_error(error: &EngineError) -> ErrorKind {
    match error {
        EngineError::PasswordRequired(_) => ErrorKind::PasswordProtected,
        EngineError::InvalidDocument(_) => ErrorKind::InvalidDocument,
        EngineError::MissingDocument(_) => ErrorKind::DocumentUnreadable,
        EngineError::WorkerNotConfigured => ErrorKind::EngineUnavailable,
        EngineError::PageOutOfRange { .. } | EngineError::WorkerGone | EngineError::Other(_) => {
            ErrorKind::UnknownError
        }
    }
}

/// Turn an unstructured engine message into an [`EngineError`] code.
///
/// For engines that only report free-form text. Matching is
/// case-insensitive; anything unrecognised becomes [`EngineError::Other`].
pub fn classify_message(message: &str) -> EngineError {
    let lower = message.to_lowercase();
    let owned = message.to_string();

    if lower.contains("password") || lower.contains("encrypted") {
        EngineError::PasswordRequired(owned)
    } else if lower.contains("invalid pdf")
        || lower.contains("format error")
        || lower.contains("corrupt")
        || lower.contains("no objects found")
        || lower.contains("cannot recognize")
        || lower.contains("xref")
        || lower.contains("syntax error")
    {
        EngineError::InvalidDocument(owned)
    } else if lower.contains("missing pdf") || lower.contains("no such file") {
        EngineError::MissingDocument(owned)
    } else {
        EngineError::Other(owned)
    }
}
