//! Mock engine and source file for testing.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::engine::{
    DocumentEngine, DocumentHandle, EngineError, PageHandle, TextContent, WorkerOptions,
};
use crate::source::SourceFile;

/// Scripted behaviour of one page in a [`MockEngine`] document.
#[derive(Clone, Debug)]
pub struct MockPage {
    runs: Vec<String>,
    failure: Option<EngineError>,
    delay: Option<Duration>,
}

impl MockPage {
    pub fn text(runs: &[&str]) -> Self {
        Self {
            runs: runs.iter().map(|r| r.to_string()).collect(),
            failure: None,
            delay: None,
        }
    }

    /// A page whose text fetch fails with `error`.
    pub fn failing(error: EngineError) -> Self {
        Self {
            runs: vec![],
            failure: Some(error),
            delay: None,
        }
    }

    /// Simulated latency of the text fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Call counters shared between the engine and the handles it opens.
#[derive(Debug, Default)]
struct Calls {
    open: AtomicUsize,
    page: AtomicUsize,
    release: AtomicUsize,
    dropped_unreleased: AtomicUsize,
}

/// A hand-rolled mock implementing [`DocumentEngine`] for tests.
///
/// Supports:
/// - A scripted open outcome (a list of pages, or an open failure).
/// - Per-page runs, failures and latency.
/// - A failing release.
/// - Call counting for open, page and release.
pub struct MockEngine {
    options: Option<WorkerOptions>,
    pages: Arc<Vec<MockPage>>,
    open_failure: Option<EngineError>,
    open_delay: Option<Duration>,
    release_failure: Option<EngineError>,
    release_delay: Option<Duration>,
    calls: Arc<Calls>,
}

impl MockEngine {
    /// An engine whose documents contain `pages`.
    pub fn with_pages(pages: Vec<MockPage>) -> Self {
        Self {
            options: Some(WorkerOptions::new()),
            pages: Arc::new(pages),
            open_failure: None,
            open_delay: None,
            release_failure: None,
            release_delay: None,
            calls: Arc::new(Calls::default()),
        }
    }

    /// An engine whose `open_document` always fails with `error`.
    pub fn failing_open(error: EngineError) -> Self {
        Self {
            open_failure: Some(error),
            ..Self::with_pages(vec![])
        }
    }

    /// Drop the worker configuration surface.
    pub fn without_worker_options(mut self) -> Self {
        self.options = None;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn with_release_failure(mut self, error: EngineError) -> Self {
        self.release_failure = Some(error);
        self
    }

    /// Simulated latency of `release`.
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = Some(delay);
        self
    }

    pub fn worker_src(&self) -> Option<String> {
        self.options
            .as_ref()
            .and_then(|o| o.worker_src())
            .map(|s| s.to_string())
    }

    pub fn open_calls(&self) -> usize {
        self.calls.open.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.calls.page.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.calls.release.load(Ordering::SeqCst)
    }

    /// Handles dropped without going through `release`.
    pub fn dropped_unreleased(&self) -> usize {
        self.calls.dropped_unreleased.load(Ordering::SeqCst)
    }
}

impl DocumentEngine for MockEngine {
    fn worker_options(&self) -> Option<&WorkerOptions> {
        self.options.as_ref()
    }

    fn open_document(
        &self,
        _bytes: Vec<u8>,
    ) -> BoxFuture<'_, Result<Box<dyn DocumentHandle>, EngineError>> {
        self.calls.open.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(d) = self.open_delay {
                tokio::time::sleep(d).await;
            }
            if let Some(ref err) = self.open_failure {
                return Err(err.clone());
            }
            let handle = MockHandle {
                pages: Arc::clone(&self.pages),
                release_failure: self.release_failure.clone(),
                release_delay: self.release_delay,
                calls: Arc::clone(&self.calls),
                released: false,
            };
            Ok(Box::new(handle) as Box<dyn DocumentHandle>)
        })
    }
}

struct MockHandle {
    pages: Arc<Vec<MockPage>>,
    release_failure: Option<EngineError>,
    release_delay: Option<Duration>,
    calls: Arc<Calls>,
    released: bool,
}

impl DocumentHandle for MockHandle {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, number: usize) -> BoxFuture<'_, Result<Box<dyn PageHandle>, EngineError>> {
        self.calls.page.fetch_add(1, Ordering::SeqCst);
        let page = number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .cloned()
            .ok_or(EngineError::PageOutOfRange {
                number,
                count: self.pages.len(),
            });
        Box::pin(async move { page.map(|p| Box::new(MockPageHandle(p)) as Box<dyn PageHandle>) })
    }

    fn release(mut self: Box<Self>) -> BoxFuture<'static, Result<(), EngineError>> {
        self.released = true;
        self.calls.release.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.release_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        let delay = self.release_delay;
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            outcome
        })
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if !self.released {
            self.calls.dropped_unreleased.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct MockPageHandle(MockPage);

impl PageHandle for MockPageHandle {
    fn text_content(&self) -> BoxFuture<'_, Result<TextContent, EngineError>> {
        Box::pin(async move {
            if let Some(d) = self.0.delay {
                tokio::time::sleep(d).await;
            }
            match self.0.failure {
                Some(ref err) => Err(err.clone()),
                None => Ok(TextContent::new(self.0.runs.clone())),
            }
        })
    }
}

/// An in-memory [`SourceFile`] that counts reads and can be scripted to fail.
pub struct MockFile {
    name: String,
    bytes: Vec<u8>,
    failure: Option<String>,
    delay: Option<Duration>,
    reads: AtomicUsize,
}

impl MockFile {
    pub fn new(name: &str, bytes: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            failure: None,
            delay: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// A file whose read fails with `message`.
    pub fn unreadable(name: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(name, b"")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SourceFile for MockFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> &str {
        "application/pdf"
    }

    fn read_bytes(&self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            match self.failure {
                Some(ref msg) => Err(io::Error::other(msg.clone())),
                None => Ok(self.bytes.clone()),
            }
        })
    }
}
