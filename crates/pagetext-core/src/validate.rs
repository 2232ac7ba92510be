use std::sync::Arc;

use crate::error::{ErrorKind, ExtractError};
use crate::source::{Input, SourceFile};
use crate::Stage;

/// Reject missing or non-file inputs. Performs no I/O.
pub fn validate(input: Option<&Input>) -> Result<&Arc<dyn SourceFile>, ExtractError> {
    match input {
        Some(Input::File(file)) => Ok(file),
        Some(Input::Other { description }) => {
            Err(ExtractError::new(ErrorKind::InvalidInput, Stage::Validating)
                .with_detail(description.clone()))
        }
        None => Err(ExtractError::new(ErrorKind::InvalidInput, Stage::Validating)
            .with_message("No file provided for text extraction.")
            .with_detail("input is missing")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryFile;

    #[test]
    fn accepts_files() {
        let input = Input::file(MemoryFile::new("a.pdf", vec![0u8]));
        let file = validate(Some(&input)).unwrap();
        assert_eq!(file.name(), "a.pdf");
    }

    #[test]
    fn rejects_missing_input() {
        let err = validate(None).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(err.stage, Stage::Validating);
        assert_eq!(err.message, "No file provided for text extraction.");
    }

    #[test]
    fn rejects_non_file_handles() {
        let input = Input::Other {
            description: "stdin stream".into(),
        };
        let err = validate(Some(&input)).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(err.detail.as_deref(), Some("stdin stream"));
    }
}
