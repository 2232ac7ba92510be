use std::fmt;

pub mod classify;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod messenger;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pipeline;
pub mod source;
pub mod validate;
pub mod worker;

// Re-export for convenience
pub use classify::{classify_message, classify_open_error};
pub use engine::{DocumentEngine, DocumentHandle, EngineError, PageHandle, TextContent, WorkerOptions};
pub use error::{ErrorKind, ExtractError};
pub use messenger::{AlertMessenger, Messenger, SilentMessenger};
pub use pipeline::{DEFAULT_MAX_IN_FLIGHT, ExtractOptions, Extractor, FetchStrategy};
pub use source::{Input, LocalFile, MemoryFile, SourceFile};
pub use validate::validate;
pub use worker::{DEFAULT_WORKER_SRC, ensure_worker_configured};

pub use tokio_util::sync::CancellationToken;

/// Separator placed between consecutive page fragments.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Separator placed between the text runs of a single page.
pub const RUN_SEPARATOR: &str = " ";

/// Text extracted from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Page fragments in ascending page order, joined by [`PAGE_SEPARATOR`].
    pub text: String,
    pub page_count: usize,
}

/// Where an extraction call was when it finished or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validating,
    BootstrappingWorker,
    ReadingFile,
    OpeningDocument,
    FetchingPages,
    Joining,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::BootstrappingWorker => "bootstrapping_worker",
            Stage::ReadingFile => "reading_file",
            Stage::OpeningDocument => "opening_document",
            Stage::FetchingPages => "fetching_pages",
            Stage::Joining => "joining",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
