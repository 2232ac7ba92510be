use std::io::Write;

use owo_colors::OwoColorize;
use pagetext_core::{ExtractError, ExtractionResult, Messenger};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Messenger that writes to stderr, prefixed with the document name.
pub struct TerminalMessenger {
    name: String,
    color: ColorMode,
}

impl TerminalMessenger {
    pub fn new(name: impl Into<String>, color: ColorMode) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

impl Messenger for TerminalMessenger {
    fn notify(&self, message: &str, is_error: bool) {
        let mut w = std::io::stderr().lock();
        let _ = match (is_error, self.color.enabled()) {
            (true, true) => writeln!(w, "{} {}: {}", "error:".red().bold(), self.name, message),
            (true, false) => writeln!(w, "error: {}: {}", self.name, message),
            (false, true) => writeln!(w, "{}: {}", self.name.green(), message),
            (false, false) => writeln!(w, "{}: {}", self.name, message),
        };
    }
}

/// Print the separator line shown before each document when several are extracted.
pub fn print_header(w: &mut dyn Write, name: &str, color: ColorMode) -> std::io::Result<()> {
    let header = format!("==> {} <==", name);
    if color.enabled() {
        writeln!(w, "{}", header.bold())
    } else {
        writeln!(w, "{}", header)
    }
}

/// Print one document's text. Failures were already reported by the messenger.
pub fn print_result(
    w: &mut dyn Write,
    result: &Result<ExtractionResult, ExtractError>,
) -> std::io::Result<()> {
    if let Ok(extraction) = result {
        writeln!(w, "{}", extraction.text)?;
    }
    Ok(())
}

/// Counts of how a batch of extractions ended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub extracted: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub pages: usize,
}

impl Tally {
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a Result<ExtractionResult, ExtractError>>,
    ) -> Self {
        let mut tally = Tally::default();
        for result in results {
            match result {
                Ok(extraction) => {
                    tally.extracted += 1;
                    tally.pages += extraction.page_count;
                }
                Err(e) if e.is_cancelled() => tally.cancelled += 1,
                Err(_) => tally.failed += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.extracted + self.failed + self.cancelled
    }
}

/// Print the closing summary line.
pub fn print_summary(w: &mut dyn Write, tally: &Tally, color: ColorMode) -> std::io::Result<()> {
    let line = format!(
        "Extracted {} of {} documents ({} pages)",
        tally.extracted,
        tally.total(),
        tally.pages
    );
    if color.enabled() {
        if tally.failed > 0 {
            write!(w, "{}", line.yellow())?;
        } else {
            write!(w, "{}", line.green())?;
        }
    } else {
        write!(w, "{}", line)?;
    }

    let mut extras = Vec::new();
    if tally.failed > 0 {
        extras.push(format!("{} failed", tally.failed));
    }
    if tally.cancelled > 0 {
        extras.push(format!("{} cancelled", tally.cancelled));
    }
    if extras.is_empty() {
        writeln!(w)
    } else {
        writeln!(w, ", {}", extras.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetext_core::{ErrorKind, Stage};

    fn ok(pages: usize) -> Result<ExtractionResult, ExtractError> {
        Ok(ExtractionResult {
            text: "text".to_string(),
            page_count: pages,
        })
    }

    #[test]
    fn tally_counts_outcomes() {
        let results = vec![
            ok(3),
            ok(2),
            Err(ExtractError::new(ErrorKind::InvalidDocument, Stage::OpeningDocument)),
            Err(ExtractError::new(ErrorKind::Cancelled, Stage::FetchingPages)),
        ];
        let tally = Tally::from_results(&results);
        assert_eq!(
            tally,
            Tally {
                extracted: 2,
                failed: 1,
                cancelled: 1,
                pages: 5,
            }
        );
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn summary_without_color() {
        let tally = Tally {
            extracted: 1,
            failed: 1,
            cancelled: 0,
            pages: 4,
        };
        let mut buf = Vec::new();
        print_summary(&mut buf, &tally, ColorMode(false)).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Extracted 1 of 2 documents (4 pages), 1 failed\n"
        );
    }

    #[test]
    fn failed_result_prints_nothing() {
        let mut buf = Vec::new();
        let err = Err(ExtractError::new(ErrorKind::FileReadError, Stage::ReadingFile));
        print_result(&mut buf, &err).unwrap();
        assert!(buf.is_empty());

        print_result(&mut buf, &ok(1)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "text\n");
    }
}
