//! The external document engine, seen from the pipeline.
//!
//! An engine opens raw bytes into a [`DocumentHandle`]; a handle hands out
//! [`PageHandle`]s by 1-based page number; a page yields its [`TextContent`].
//! Every successfully opened handle must be given back through
//! [`DocumentHandle::release`].

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::RUN_SEPARATOR;

/// Failure codes an engine reports back to the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("password required: {0}")]
    PasswordRequired(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("missing or unreadable document: {0}")]
    MissingDocument(String),
    #[error("worker source is not configured")]
    WorkerNotConfigured,
    #[error("page {number} out of range (document has {count} pages)")]
    PageOutOfRange { number: usize, count: usize },
    #[error("document worker is gone")]
    WorkerGone,
    #[error("{0}")]
    Other(String),
}

/// Ordered text runs of a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextContent {
    pub runs: Vec<String>,
}

impl TextContent {
    pub fn new(runs: Vec<String>) -> Self {
        Self { runs }
    }

    /// The page fragment: runs joined by single spaces.
    pub fn join_runs(&self) -> String {
        self.runs.join(RUN_SEPARATOR)
    }
}

/// Worker configuration surface of an engine.
///
/// The value is shared by every document the engine opens. Setting it is
/// idempotent and safe to race: concurrent writers store the same source.
pub struct WorkerOptions {
    worker_src: ArcSwapOption<String>,
}

impl WorkerOptions {
    pub fn new() -> Self {
        Self {
            worker_src: ArcSwapOption::empty(),
        }
    }

    pub fn set_worker_src(&self, src: &str) {
        self.worker_src.store(Some(Arc::new(src.to_string())));
    }

    pub fn worker_src(&self) -> Option<Arc<String>> {
        self.worker_src.load_full()
    }

    pub fn is_configured(&self) -> bool {
        self.worker_src.load().is_some()
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("worker_src", &self.worker_src())
            .finish()
    }
}

/// A document parsing engine.
pub trait DocumentEngine: Send + Sync {
    /// The engine's worker configuration entry point, or `None` if this
    /// engine exposes no such surface (and therefore cannot be bootstrapped).
    fn worker_options(&self) -> Option<&WorkerOptions>;

    /// Parse `bytes` into an open document.
    fn open_document(&self, bytes: Vec<u8>)
    -> BoxFuture<'_, Result<Box<dyn DocumentHandle>, EngineError>>;
}

/// An opened document.
///
/// Implementations must also free their resources when dropped without an
/// explicit release (e.g. when the extraction future itself is dropped).
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;

    /// Load page `number` (1-based).
    fn page(&self, number: usize) -> BoxFuture<'_, Result<Box<dyn PageHandle>, EngineError>>;

    /// Release the document. Consumes the handle, so it runs at most once.
    fn release(self: Box<Self>) -> BoxFuture<'static, Result<(), EngineError>>;
}

/// A loaded page.
pub trait PageHandle: Send + Sync {
    fn text_content(&self) -> BoxFuture<'_, Result<TextContent, EngineError>>;
}
