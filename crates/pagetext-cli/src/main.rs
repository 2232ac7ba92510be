use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pagetext_core::config_file::{self, ConfigFile, EngineConfig, ExtractionConfig, StrategyName};
use pagetext_core::{
    CancellationToken, DocumentEngine, ExtractOptions, Extractor, FetchStrategy, Input, Messenger,
    SilentMessenger,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

mod output;

use output::{ColorMode, Tally, TerminalMessenger};

/// Documents extracted at the same time unless `--jobs` says otherwise.
const DEFAULT_JOBS: usize = 4;

/// Extract plain text from documents, page by page
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the text of one or more documents
    Extract {
        /// Documents to extract
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Fetch pages one at a time, in order
        #[arg(long, conflicts_with = "max_in_flight")]
        sequential: bool,

        /// Maximum number of pages fetched concurrently per document
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Maximum number of documents extracted at the same time
        #[arg(short, long, default_value_t = DEFAULT_JOBS)]
        jobs: usize,

        /// Per-stage timeout in seconds (0 disables)
        #[arg(long)]
        timeout: Option<u64>,

        /// Worker source used to bootstrap the engine
        #[arg(long)]
        worker_src: Option<String>,

        /// Write extracted text to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Do not print notifications or the summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Command-line overrides, applied over environment and config file.
#[derive(Debug, Default)]
struct Overrides {
    sequential: bool,
    max_in_flight: Option<usize>,
    timeout: Option<u64>,
    worker_src: Option<String>,
}

/// Fully resolved settings for a run.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    worker_src: String,
    options: ExtractOptions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Config => print_config(),
        Command::Extract {
            files,
            sequential,
            max_in_flight,
            jobs,
            timeout,
            worker_src,
            output,
            no_color,
            quiet,
        } => {
            let overrides = Overrides {
                sequential,
                max_in_flight,
                timeout,
                worker_src,
            };
            extract(files, overrides, jobs, output, no_color, quiet).await
        }
    }
}

fn print_config() -> anyhow::Result<()> {
    let settings = resolve(&config_file::load_config(), &Overrides::default());
    let rendered = toml::to_string_pretty(&effective_config(&settings))?;
    print!("{}", rendered);
    Ok(())
}

async fn extract(
    files: Vec<PathBuf>,
    overrides: Overrides,
    jobs: usize,
    output: Option<PathBuf>,
    no_color: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let settings = resolve(&config_file::load_config(), &overrides);
    tracing::debug!(?settings, "resolved settings");

    let use_color = !no_color && output.is_none();
    let color = ColorMode(use_color);
    let status_color = ColorMode(!no_color);

    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let engine = build_engine();
    let extractions: Vec<(Extractor, Input)> = files
        .iter()
        .map(|path| {
            let messenger: Arc<dyn Messenger> = if quiet {
                Arc::new(SilentMessenger)
            } else {
                Arc::new(TerminalMessenger::new(
                    path.display().to_string(),
                    status_color,
                ))
            };
            let extractor = Extractor::new(engine.clone())
                .with_worker_src(settings.worker_src.clone())
                .with_options(settings.options.clone())
                .with_messenger(messenger);
            (extractor, Input::from_path(path.clone()))
        })
        .collect();

    let results = run_bounded(extractions, jobs, move |(extractor, input)| {
        let cancel = cancel.clone();
        async move { extractor.extract_text(Some(&input), &cancel).await }
    })
    .await?;

    let several = files.len() > 1;
    for (i, (path, result)) in files.iter().zip(&results).enumerate() {
        if several {
            if i > 0 {
                writeln!(writer)?;
            }
            output::print_header(&mut writer, &path.display().to_string(), color)?;
        }
        output::print_result(&mut writer, result)?;
    }
    writer.flush()?;

    let tally = Tally::from_results(&results);
    if !quiet && several {
        output::print_summary(&mut std::io::stderr(), &tally, status_color)?;
    }

    if tally.failed > 0 || tally.cancelled > 0 {
        anyhow::bail!(
            "{} of {} documents were not extracted",
            tally.failed + tally.cancelled,
            tally.total()
        );
    }
    Ok(())
}

/// Run `task` over `items` with at most `jobs` running at once. Results come
/// back in input order.
async fn run_bounded<I, F, Fut>(
    items: Vec<I>,
    jobs: usize,
    task: F,
) -> anyhow::Result<Vec<Fut::Output>>
where
    I: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    let count = items.len();
    let mut tasks = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        let work = task(item);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (index, work.await)
        });
    }

    let mut slots: Vec<Option<Fut::Output>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, output) = joined?;
        slots[index] = Some(output);
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(feature = "pdf")]
fn build_engine() -> Option<Arc<dyn DocumentEngine>> {
    Some(Arc::new(pagetext_mupdf::MupdfEngine::new()))
}

#[cfg(not(feature = "pdf"))]
fn build_engine() -> Option<Arc<dyn DocumentEngine>> {
    tracing::warn!("built without a document engine; extraction will fail");
    None
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Resolve configuration: CLI flags > env vars > config file > defaults
fn resolve(config: &ConfigFile, overrides: &Overrides) -> Settings {
    let mut options = config.extract_options();

    let worker_src = overrides
        .worker_src
        .clone()
        .or_else(|| env_var("PAGETEXT_WORKER_SRC"))
        .unwrap_or_else(|| config.worker_src());

    if overrides.sequential {
        options.strategy = FetchStrategy::Sequential;
    } else if let Some(max) = overrides
        .max_in_flight
        .or_else(|| env_parse("PAGETEXT_MAX_IN_FLIGHT"))
    {
        options.strategy = FetchStrategy::Concurrent {
            max_in_flight: max.max(1),
        };
    }

    if let Some(secs) = overrides
        .timeout
        .or_else(|| env_parse("PAGETEXT_TIMEOUT"))
    {
        let limit = (secs > 0).then(|| Duration::from_secs(secs));
        options.read_timeout = limit;
        options.open_timeout = limit;
        options.page_timeout = limit;
        options.release_timeout = limit;
    }

    Settings {
        worker_src,
        options,
    }
}

/// The resolved settings written back as a complete config file.
fn effective_config(settings: &Settings) -> ConfigFile {
    let secs = |limit: Option<Duration>| Some(limit.map_or(0, |d| d.as_secs()));
    let (strategy, max_in_flight) = match settings.options.strategy {
        FetchStrategy::Concurrent { max_in_flight } => {
            (StrategyName::Concurrent, Some(max_in_flight))
        }
        FetchStrategy::Sequential => (StrategyName::Sequential, None),
    };

    ConfigFile {
        engine: Some(EngineConfig {
            worker_src: Some(settings.worker_src.clone()),
        }),
        extraction: Some(ExtractionConfig {
            strategy: Some(strategy),
            max_in_flight,
            read_timeout_secs: secs(settings.options.read_timeout),
            open_timeout_secs: secs(settings.options.open_timeout),
            page_timeout_secs: secs(settings.options.page_timeout),
            release_timeout_secs: secs(settings.options.release_timeout),
            notify_success: Some(settings.options.notify_success),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(toml_src: &str) -> ConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_runs_cap_concurrency_and_keep_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<u64> = (0..10).collect();

        let results = run_bounded(items, 3, |i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100 - i * 7)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await
        .unwrap();

        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn flags_override_config_file() {
        let config = config_from(
            r#"
[engine]
worker_src = "from-file"

[extraction]
strategy = "concurrent"
max_in_flight = 2
page_timeout_secs = 5
"#,
        );
        let overrides = Overrides {
            sequential: true,
            max_in_flight: None,
            timeout: Some(0),
            worker_src: Some("from-flag".to_string()),
        };

        let settings = resolve(&config, &overrides);
        assert_eq!(settings.worker_src, "from-flag");
        assert_eq!(settings.options.strategy, FetchStrategy::Sequential);
        assert_eq!(settings.options.page_timeout, None);
        assert_eq!(settings.options.read_timeout, None);
    }

    #[test]
    fn max_in_flight_flag_selects_concurrent() {
        let config = config_from("[extraction]\nstrategy = \"sequential\"\n");
        let overrides = Overrides {
            max_in_flight: Some(0),
            ..Default::default()
        };

        let settings = resolve(&config, &overrides);
        assert_eq!(
            settings.options.strategy,
            FetchStrategy::Concurrent { max_in_flight: 1 }
        );
    }

    #[test]
    fn effective_config_round_trips() {
        let settings = Settings {
            worker_src: "builtin:test".to_string(),
            options: ExtractOptions {
                strategy: FetchStrategy::Concurrent { max_in_flight: 3 },
                read_timeout: Some(Duration::from_secs(7)),
                open_timeout: None,
                page_timeout: Some(Duration::from_secs(9)),
                release_timeout: None,
                notify_success: true,
            },
        };

        let rendered = toml::to_string_pretty(&effective_config(&settings)).unwrap();
        let parsed: ConfigFile = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.worker_src(), "builtin:test");
        assert_eq!(parsed.extract_options(), settings.options);
    }
}
