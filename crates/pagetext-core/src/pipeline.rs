//! The extraction pipeline.
//!
//! Validating → BootstrappingWorker → ReadingFile → OpeningDocument →
//! FetchingPages → Joining. Once a document handle exists it is released
//! exactly once, whatever happens afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;

use crate::classify::classify_open_error;
use crate::engine::{DocumentEngine, DocumentHandle, EngineError};
use crate::error::{ErrorKind, ExtractError};
use crate::messenger::{AlertMessenger, Messenger};
use crate::source::{Input, SourceFile};
use crate::validate::validate;
use crate::worker::{DEFAULT_WORKER_SRC, ensure_worker_configured};
use crate::{ExtractionResult, PAGE_SEPARATOR, Stage};

/// Default cap on concurrently fetched pages.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// How pages are fetched after the document is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Interleave up to `max_in_flight` page fetches.
    Concurrent { max_in_flight: usize },
    /// One page at a time, in order.
    Sequential,
}

impl Default for FetchStrategy {
    fn default() -> Self {
        FetchStrategy::Concurrent {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Tunables for an [`Extractor`]. A `None` timeout disables that limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub strategy: FetchStrategy,
    pub read_timeout: Option<Duration>,
    pub open_timeout: Option<Duration>,
    /// Applies to each page (load plus text fetch) separately.
    pub page_timeout: Option<Duration>,
    /// Bounds the release of an opened document. Not affected by cancellation.
    pub release_timeout: Option<Duration>,
    /// Also notify the messenger on success.
    pub notify_success: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::default(),
            read_timeout: Some(Duration::from_secs(30)),
            open_timeout: Some(Duration::from_secs(60)),
            page_timeout: Some(Duration::from_secs(30)),
            release_timeout: Some(Duration::from_secs(10)),
            notify_success: false,
        }
    }
}

/// Maps a document-open failure onto the taxonomy.
pub type Classifier = Arc<dyn Fn(&EngineError) -> ErrorKind + Send + Sync>;

/// Extracts page text from documents through a [`DocumentEngine`].
///
/// One extractor can serve any number of concurrent calls; each call owns
/// its bytes and its document handle.
pub struct Extractor {
    engine: Option<Arc<dyn DocumentEngine>>,
    worker_src: String,
    messenger: Arc<dyn Messenger>,
    classifier: Classifier,
    options: ExtractOptions,
}

impl Extractor {
    /// `None` means no engine is loaded; every call then fails with
    /// [`ErrorKind::EngineUnavailable`].
    pub fn new(engine: Option<Arc<dyn DocumentEngine>>) -> Self {
        Self {
            engine,
            worker_src: DEFAULT_WORKER_SRC.to_string(),
            messenger: Arc::new(AlertMessenger),
            classifier: Arc::new(classify_open_error),
            options: ExtractOptions::default(),
        }
    }

    pub fn with_worker_src(mut self, worker_src: impl Into<String>) -> Self {
        self.worker_src = worker_src.into();
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&EngineError) -> ErrorKind + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn worker_src(&self) -> &str {
        &self.worker_src
    }

    /// Extract the text of every page of `input`.
    ///
    /// Failures are reported once through the messenger (except cancellation)
    /// and returned. The result text is the page fragments in page order
    /// joined by a blank line.
    pub async fn extract_text(
        &self,
        input: Option<&Input>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        match self.run(input, cancel).await {
            Ok(result) => {
                tracing::info!(
                    file = input.map(Input::name).unwrap_or_default(),
                    pages = result.page_count,
                    chars = result.text.len(),
                    "extraction complete"
                );
                if self.options.notify_success {
                    self.messenger.notify(
                        &format!(
                            "Extracted text from {} page{}.",
                            result.page_count,
                            if result.page_count == 1 { "" } else { "s" }
                        ),
                        false,
                    );
                }
                Ok(result)
            }
            Err(err) => {
                self.report(input, &err);
                Err(err)
            }
        }
    }

    fn report(&self, input: Option<&Input>, err: &ExtractError) {
        let file = input.map(Input::name).unwrap_or_default();
        if err.is_cancelled() {
            tracing::debug!(file, stage = %err.stage, "extraction cancelled");
            return;
        }
        tracing::error!(
            file,
            stage = %err.stage,
            kind = %err.kind,
            detail = err.detail.as_deref().unwrap_or(""),
            "extraction failed"
        );
        self.messenger.notify(&err.message, true);
    }

    async fn run(
        &self,
        input: Option<&Input>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        let file = validate(input)?;
        let engine = self.bootstrap()?;
        let bytes = self.read_file(file.as_ref(), cancel).await?;
        let handle = self.open_document(engine, bytes, cancel).await?;

        let outcome = self.collect_pages(handle.as_ref(), cancel).await;
        let released = self.release(handle).await;

        match (outcome, released) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(result), Err(e)) => {
                tracing::warn!(file = file.name(), error = %e, "failed to release document");
                Ok(result)
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(e)) => {
                tracing::warn!(file = file.name(), error = %e, "failed to release document");
                Err(err.with_release_error(e))
            }
        }
    }

    async fn release(&self, handle: Box<dyn DocumentHandle>) -> Result<(), String> {
        let release = handle.release();
        let released = match self.options.release_timeout {
            Some(limit) => match tokio::time::timeout(limit, release).await {
                Ok(released) => released,
                Err(_) => {
                    return Err(format!(
                        "release timed out after {}s",
                        limit.as_secs_f64()
                    ));
                }
            },
            None => release.await,
        };
        released.map_err(|e| e.to_string())
    }

    fn bootstrap(&self) -> Result<&dyn DocumentEngine, ExtractError> {
        tracing::debug!(stage = %Stage::BootstrappingWorker, "configuring worker");
        self.engine
            .as_deref()
            .filter(|engine| ensure_worker_configured(Some(*engine), &self.worker_src))
            .ok_or_else(|| {
                ExtractError::new(ErrorKind::EngineUnavailable, Stage::BootstrappingWorker)
                    .with_detail(match self.engine {
                        Some(_) => "worker configuration failed",
                        None => "no document engine loaded",
                    })
            })
    }

    async fn read_file(
        &self,
        file: &dyn SourceFile,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExtractError> {
        tracing::debug!(file = file.name(), stage = %Stage::ReadingFile, "reading file");
        match guarded(file.read_bytes(), self.options.read_timeout, cancel).await {
            Ok(Ok(bytes)) => {
                tracing::debug!(file = file.name(), bytes = bytes.len(), "file read");
                Ok(bytes)
            }
            Ok(Err(e)) => Err(ExtractError::new(ErrorKind::FileReadError, Stage::ReadingFile)
                .with_detail(e.to_string())),
            Err(interrupt) => Err(interrupt.into_error(ErrorKind::FileReadError, Stage::ReadingFile)),
        }
    }

    async fn open_document(
        &self,
        engine: &dyn DocumentEngine,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DocumentHandle>, ExtractError> {
        tracing::debug!(stage = %Stage::OpeningDocument, "opening document");
        match guarded(engine.open_document(bytes), self.options.open_timeout, cancel).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => {
                let kind = (self.classifier)(&e);
                Err(ExtractError::new(kind, Stage::OpeningDocument).with_detail(e.to_string()))
            }
            Err(interrupt) => {
                Err(interrupt.into_error(ErrorKind::UnknownError, Stage::OpeningDocument))
            }
        }
    }

    async fn collect_pages(
        &self,
        handle: &dyn DocumentHandle,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        let page_count = handle.page_count();
        tracing::debug!(stage = %Stage::FetchingPages, pages = page_count, "fetching pages");
        if page_count == 0 {
            return Ok(ExtractionResult {
                text: String::new(),
                page_count: 0,
            });
        }

        let fragments = match self.options.strategy {
            FetchStrategy::Sequential => {
                let mut fragments = Vec::with_capacity(page_count);
                for number in 1..=page_count {
                    let text = self
                        .fetch_page(handle, number, cancel)
                        .await
                        .map_err(|f| f.into_error(fragments.len(), page_count))?;
                    fragments.push(text);
                }
                fragments
            }
            FetchStrategy::Concurrent { max_in_flight } => {
                let mut slots: Vec<Option<String>> = vec![None; page_count];
                let mut completed = 0;
                let mut fetches = stream::iter(1..=page_count)
                    .map(move |number| async move {
                        (number, self.fetch_page(handle, number, cancel).await)
                    })
                    .buffer_unordered(max_in_flight.max(1));

                while let Some((number, result)) = fetches.next().await {
                    match result {
                        Ok(text) => {
                            slots[number - 1] = Some(text);
                            completed += 1;
                        }
                        Err(failure) => return Err(failure.into_error(completed, page_count)),
                    }
                }
                slots.into_iter().flatten().collect()
            }
        };

        tracing::debug!(stage = %Stage::Joining, pages = page_count, "joining page text");
        Ok(ExtractionResult {
            text: fragments.join(PAGE_SEPARATOR),
            page_count,
        })
    }

    async fn fetch_page(
        &self,
        handle: &dyn DocumentHandle,
        number: usize,
        cancel: &CancellationToken,
    ) -> Result<String, PageFailure> {
        let fetch = async {
            let page = handle.page(number).await?;
            let content = page.text_content().await?;
            Ok::<_, EngineError>(content.join_runs())
        };

        match guarded(fetch, self.options.page_timeout, cancel).await {
            Ok(Ok(text)) => {
                tracing::trace!(page = number, chars = text.len(), "page text fetched");
                Ok(text)
            }
            Ok(Err(error)) => Err(PageFailure {
                number,
                cause: PageCause::Engine(error),
            }),
            Err(Interrupt::TimedOut(limit)) => Err(PageFailure {
                number,
                cause: PageCause::TimedOut(limit),
            }),
            Err(Interrupt::Cancelled) => Err(PageFailure {
                number,
                cause: PageCause::Cancelled,
            }),
        }
    }
}

/// Why a stage stopped before its future resolved.
enum Interrupt {
    TimedOut(Duration),
    Cancelled,
}

impl Interrupt {
    fn into_error(self, timeout_kind: ErrorKind, stage: Stage) -> ExtractError {
        match self {
            Interrupt::Cancelled => ExtractError::new(ErrorKind::Cancelled, stage),
            Interrupt::TimedOut(limit) => ExtractError::new(timeout_kind, stage)
                .with_detail(format!("timed out after {}s", limit.as_secs_f64())),
        }
    }
}

/// Run `fut` under an optional time limit, giving up early on cancellation.
async fn guarded<F: Future>(
    fut: F,
    limit: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<F::Output, Interrupt> {
    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Interrupt::TimedOut(limit)),
            None => Ok(fut.await),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        out = bounded => out,
    }
}

struct PageFailure {
    number: usize,
    cause: PageCause,
}

enum PageCause {
    Engine(EngineError),
    TimedOut(Duration),
    Cancelled,
}

impl PageFailure {
    fn into_error(self, completed: usize, total: usize) -> ExtractError {
        let detail = match self.cause {
            PageCause::Cancelled => {
                return ExtractError::new(ErrorKind::Cancelled, Stage::FetchingPages)
                    .with_detail(format!("cancelled at page {}", self.number));
            }
            PageCause::Engine(e) => format!("page {}: {}", self.number, e),
            PageCause::TimedOut(limit) => format!(
                "page {}: timed out after {}s",
                self.number,
                limit.as_secs_f64()
            ),
        };
        ExtractError::new(ErrorKind::PageExtractionError, Stage::FetchingPages)
            .with_detail(detail)
            .with_pages_completed(completed, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SilentMessenger;
    use crate::mock::{MockEngine, MockFile, MockPage};

    fn extractor(engine: Arc<MockEngine>) -> Extractor {
        Extractor::new(Some(engine as Arc<dyn DocumentEngine>))
            .with_messenger(Arc::new(SilentMessenger))
    }

    fn pdf() -> Input {
        Input::file(MockFile::new("doc.pdf", b"%PDF-1.7"))
    }

    #[tokio::test]
    async fn sequential_strategy_joins_in_order() {
        let engine = Arc::new(MockEngine::with_pages(vec![
            MockPage::text(&["a", "b"]),
            MockPage::text(&["c"]),
        ]));
        let ex = extractor(engine.clone()).with_options(ExtractOptions {
            strategy: FetchStrategy::Sequential,
            ..ExtractOptions::default()
        });

        let result = ex
            .extract_text(Some(&pdf()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text, "a b\n\nc");
        assert_eq!(result.page_count, 2);
        assert_eq!(engine.release_calls(), 1);
    }

    #[tokio::test]
    async fn sequential_failure_counts_completed_pages() {
        let engine = Arc::new(MockEngine::with_pages(vec![
            MockPage::text(&["one"]),
            MockPage::text(&["two"]),
            MockPage::failing(EngineError::Other("bad font".into())),
            MockPage::text(&["four"]),
        ]));
        let ex = extractor(engine.clone()).with_options(ExtractOptions {
            strategy: FetchStrategy::Sequential,
            ..ExtractOptions::default()
        });

        let err = ex
            .extract_text(Some(&pdf()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PageExtractionError);
        assert_eq!(err.pages_completed, Some(2));
        assert_eq!(err.detail.as_deref(), Some("page 3: bad font"));
        // Page 4 is never requested.
        assert_eq!(engine.page_calls(), 3);
        assert_eq!(engine.release_calls(), 1);
    }

    #[tokio::test]
    async fn custom_classifier_is_used_for_open_failures() {
        let engine = Arc::new(MockEngine::failing_open(EngineError::Other(
            "xref damaged".into(),
        )));
        let ex = extractor(engine).with_classifier(|_| ErrorKind::InvalidDocument);

        let err = ex
            .extract_text(Some(&pdf()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidDocument);
        assert_eq!(err.stage, Stage::OpeningDocument);
    }

    #[tokio::test]
    async fn concurrency_cap_of_zero_still_makes_progress() {
        let engine = Arc::new(MockEngine::with_pages(vec![
            MockPage::text(&["x"]),
            MockPage::text(&["y"]),
        ]));
        let ex = extractor(engine).with_options(ExtractOptions {
            strategy: FetchStrategy::Concurrent { max_in_flight: 0 },
            ..ExtractOptions::default()
        });

        let result = ex
            .extract_text(Some(&pdf()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text, "x\n\ny");
    }

    #[tokio::test]
    async fn success_notification_is_optional() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let engine = Arc::new(MockEngine::with_pages(vec![MockPage::text(&["hi"])]));
        let ex = extractor(engine)
            .with_messenger(Arc::new(move |m: &str, e: bool| {
                sink.lock().unwrap().push((m.to_string(), e));
            }))
            .with_options(ExtractOptions {
                notify_success: true,
                ..ExtractOptions::default()
            });

        ex.extract_text(Some(&pdf()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("Extracted text from 1 page.".to_string(), false)]
        );
    }
}
