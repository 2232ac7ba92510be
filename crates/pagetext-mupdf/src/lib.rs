//! MuPDF-based implementation of [`DocumentEngine`].
//!
//! This crate is the sole AGPL island: it isolates the mupdf dependency so
//! that the core pipeline does not transitively depend on it.
//!
//! MuPDF documents are not thread-safe, so every opened document lives on
//! its own worker thread. The handle and its pages talk to that thread over
//! a command queue; commands are served one at a time, which makes
//! concurrent page fetches interleave rather than run in parallel.

use std::collections::HashMap;
use std::thread;

use futures_util::future::BoxFuture;
use mupdf::{Document, TextPageFlags};
use tokio::sync::oneshot;

use pagetext_core::{
    DocumentEngine, DocumentHandle, EngineError, PageHandle, TextContent, WorkerOptions,
    classify_message,
};

/// Magic passed to MuPDF when the caller does not pick a format.
pub const DEFAULT_MAGIC: &str = "application/pdf";

/// Opens documents with MuPDF.
///
/// The engine refuses to open anything until a worker source is configured.
/// MuPDF itself is linked in, so the source is only a readiness marker; it is
/// logged with every opened document.
pub struct MupdfEngine {
    options: WorkerOptions,
    magic: String,
}

impl Default for MupdfEngine {
    fn default() -> Self {
        Self {
            options: WorkerOptions::new(),
            magic: DEFAULT_MAGIC.to_string(),
        }
    }
}

impl MupdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format hint (MIME type or extension) for MuPDF's document handler lookup.
    pub fn with_magic(mut self, magic: impl Into<String>) -> Self {
        self.magic = magic.into();
        self
    }
}

impl DocumentEngine for MupdfEngine {
    fn worker_options(&self) -> Option<&WorkerOptions> {
        Some(&self.options)
    }

    fn open_document(
        &self,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, Result<Box<dyn DocumentHandle>, EngineError>> {
        Box::pin(async move {
            let worker_src = self
                .options
                .worker_src()
                .ok_or(EngineError::WorkerNotConfigured)?;

            let (commands_tx, commands_rx) = async_channel::unbounded();
            let (opened_tx, opened_rx) = oneshot::channel();
            let magic = self.magic.clone();

            thread::Builder::new()
                .name("pagetext-document".to_string())
                .spawn(move || worker_main(bytes, &magic, commands_rx, opened_tx))
                .map_err(|e| EngineError::Other(format!("failed to start document worker: {e}")))?;

            let page_count = opened_rx.await.map_err(|_| EngineError::WorkerGone)??;
            tracing::debug!(pages = page_count, worker = %worker_src, "document opened");

            Ok(Box::new(MupdfDocument {
                commands: commands_tx,
                page_count,
            }) as Box<dyn DocumentHandle>)
        })
    }
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

enum Command {
    LoadPage { number: usize, reply: Reply<()> },
    TextContent { number: usize, reply: Reply<Vec<String>> },
    Release { reply: Reply<()> },
}

/// Send a command to the document worker and wait for its answer.
async fn request<T>(
    commands: &async_channel::Sender<Command>,
    command: impl FnOnce(Reply<T>) -> Command,
) -> Result<T, EngineError> {
    let (reply, answer) = oneshot::channel();
    commands
        .send(command(reply))
        .await
        .map_err(|_| EngineError::WorkerGone)?;
    answer.await.map_err(|_| EngineError::WorkerGone)?
}

struct MupdfDocument {
    commands: async_channel::Sender<Command>,
    page_count: usize,
}

impl DocumentHandle for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, number: usize) -> BoxFuture<'_, Result<Box<dyn PageHandle>, EngineError>> {
        Box::pin(async move {
            request(&self.commands, |reply| Command::LoadPage { number, reply }).await?;
            Ok(Box::new(MupdfPage {
                number,
                commands: self.commands.clone(),
            }) as Box<dyn PageHandle>)
        })
    }

    fn release(self: Box<Self>) -> BoxFuture<'static, Result<(), EngineError>> {
        let commands = self.commands.clone();
        Box::pin(async move { request(&commands, |reply| Command::Release { reply }).await })
    }
}

struct MupdfPage {
    number: usize,
    commands: async_channel::Sender<Command>,
}

impl PageHandle for MupdfPage {
    fn text_content(&self) -> BoxFuture<'_, Result<TextContent, EngineError>> {
        let number = self.number;
        Box::pin(async move {
            let runs = request(&self.commands, |reply| Command::TextContent { number, reply })
                .await?;
            Ok(TextContent::new(runs))
        })
    }
}

/// Body of a document worker thread. Owns the MuPDF document until release,
/// or until every sender is gone.
fn worker_main(
    bytes: Vec<u8>,
    magic: &str,
    commands: async_channel::Receiver<Command>,
    opened: Reply<usize>,
) {
    let (document, page_count) = match open(&bytes, magic) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };
    drop(bytes);

    if opened.send(Ok(page_count)).is_err() {
        tracing::debug!("open abandoned by caller, dropping document");
        return;
    }

    // Text loaded by `LoadPage`, waiting for the matching `TextContent`.
    let mut loaded: HashMap<usize, Vec<String>> = HashMap::new();

    while let Ok(command) = commands.recv_blocking() {
        match command {
            Command::LoadPage { number, reply } => {
                let result = page_runs(&document, number, page_count).map(|runs| {
                    loaded.insert(number, runs);
                });
                let _ = reply.send(result);
            }
            Command::TextContent { number, reply } => {
                let result = match loaded.remove(&number) {
                    Some(runs) => Ok(runs),
                    None => page_runs(&document, number, page_count),
                };
                let _ = reply.send(result);
            }
            Command::Release { reply } => {
                drop(document);
                let _ = reply.send(Ok(()));
                return;
            }
        }
    }

    tracing::debug!("document handle dropped without release, worker exiting");
}

fn open(bytes: &[u8], magic: &str) -> Result<(Document, usize), EngineError> {
    let document =
        Document::from_bytes(bytes, magic).map_err(|e| classify_message(&e.to_string()))?;

    if document
        .needs_password()
        .map_err(|e| classify_message(&e.to_string()))?
    {
        return Err(EngineError::PasswordRequired(
            "document is encrypted".to_string(),
        ));
    }

    let page_count = document
        .page_count()
        .map_err(|e| classify_message(&e.to_string()))?;
    Ok((document, usize::try_from(page_count).unwrap_or(0)))
}

/// Text runs of page `number` (1-based): one run per non-empty text line.
fn page_runs(
    document: &Document,
    number: usize,
    page_count: usize,
) -> Result<Vec<String>, EngineError> {
    let out_of_range = EngineError::PageOutOfRange {
        number,
        count: page_count,
    };
    if number == 0 || number > page_count {
        return Err(out_of_range);
    }
    let index = i32::try_from(number - 1).map_err(|_| out_of_range)?;

    let page = document
        .load_page(index)
        .map_err(|e| EngineError::Other(e.to_string()))?;
    let text_page = page
        .to_text_page(TextPageFlags::empty())
        .map_err(|e| EngineError::Other(e.to_string()))?;

    let mut runs = Vec::new();
    for block in text_page.blocks() {
        for line in block.lines() {
            let line_text: String = line
                .chars()
                .map(|c| c.char().unwrap_or('\u{FFFD}'))
                .collect();
            let line_text = line_text.trim();
            if !line_text.is_empty() {
                runs.push(line_text.to_string());
            }
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetext_core::{
        CancellationToken, DEFAULT_WORKER_SRC, ErrorKind, Extractor, Input, MemoryFile,
        SilentMessenger, classify_open_error,
    };
    use std::sync::Arc;

    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        build_pdf(pages, false)
    }

    /// Build a small uncompressed PDF with one line of Helvetica text per page,
    /// optionally protected by the standard security handler with a user
    /// password.
    fn build_pdf(pages: &[&str], encrypted: bool) -> Vec<u8> {
        let font_id = 3;
        let first_page_id = 4;
        let kids: Vec<String> = (0..pages.len())
            .map(|i| format!("{} 0 R", first_page_id + 2 * i))
            .collect();

        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                pages.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (i, text) in pages.iter().enumerate() {
            let contents_id = first_page_id + 2 * i + 1;
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {contents_id} 0 R >>"
            ));
            let stream = format!("BT /F1 24 Tf 72 700 Td ({text}) Tj ET");
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }

        let encrypt_ref = if encrypted {
            objects.push(format!(
                "<< /Filter /Standard /V 2 /R 3 /Length 128 /P -4 /O <{}> /U <{}> >>",
                "4f".repeat(32),
                "55".repeat(32)
            ));
            format!(
                " /Encrypt {} 0 R /ID [<{id}> <{id}>]",
                objects.len(),
                id = "0123456789abcdef0123456789abcdef"
            )
        } else {
            String::new()
        };

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }
        let xref_at = out.len();
        out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            out.push_str(&format!("{:010} 00000 n \n", offset));
        }
        out.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            encrypt_ref,
            xref_at
        ));
        out.into_bytes()
    }

    fn configured_engine() -> MupdfEngine {
        let engine = MupdfEngine::new();
        engine
            .worker_options()
            .unwrap()
            .set_worker_src(DEFAULT_WORKER_SRC);
        engine
    }

    #[tokio::test]
    async fn open_requires_worker_source() {
        let engine = MupdfEngine::new();
        let err = engine
            .open_document(pdf_with_pages(&["Hello"]))
            .await
            .err()
            .unwrap();
        assert_eq!(err, EngineError::WorkerNotConfigured);
    }

    #[tokio::test]
    async fn pages_yield_their_text_lines() {
        let engine = configured_engine();
        let handle = engine
            .open_document(pdf_with_pages(&["Hello World", "Second page"]))
            .await
            .unwrap();
        assert_eq!(handle.page_count(), 2);

        let page = handle.page(2).await.unwrap();
        let content = page.text_content().await.unwrap();
        assert_eq!(content.runs, vec!["Second page".to_string()]);

        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_page_is_rejected() {
        let engine = configured_engine();
        let handle = engine
            .open_document(pdf_with_pages(&["Only"]))
            .await
            .unwrap();

        let err = handle.page(5).await.err().unwrap();
        assert_eq!(err, EngineError::PageOutOfRange { number: 5, count: 1 });
        let err = handle.page(0).await.err().unwrap();
        assert_eq!(err, EngineError::PageOutOfRange { number: 0, count: 1 });

        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_bytes_are_an_invalid_document() {
        let engine = configured_engine();
        let err = engine
            .open_document(b"this is not a document at all".to_vec())
            .await
            .err()
            .unwrap();
        assert_eq!(classify_open_error(&err), ErrorKind::InvalidDocument, "{err}");
    }

    #[tokio::test]
    async fn truncated_pdf_is_an_invalid_document() {
        let engine = configured_engine();
        let mut bytes = pdf_with_pages(&["Cut short"]);
        bytes.truncate("%PDF-1.4\n".len());

        let err = engine.open_document(bytes).await.err().unwrap();
        assert_eq!(classify_open_error(&err), ErrorKind::InvalidDocument, "{err}");
    }

    #[tokio::test]
    async fn encrypted_pdf_requires_password() {
        let engine = configured_engine();
        let err = engine
            .open_document(build_pdf(&["Secret"], true))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::PasswordRequired(_)), "{err}");
        assert_eq!(classify_open_error(&err), ErrorKind::PasswordProtected);
    }

    #[tokio::test]
    async fn extractor_end_to_end() {
        let extractor = Extractor::new(Some(Arc::new(MupdfEngine::new())))
            .with_messenger(Arc::new(SilentMessenger));
        let input = Input::file(MemoryFile::new(
            "two.pdf",
            pdf_with_pages(&["Hello World", "Second page"]),
        ));

        let result = extractor
            .extract_text(Some(&input), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.page_count, 2);
        assert_eq!(result.text, "Hello World\n\nSecond page");
    }
}
