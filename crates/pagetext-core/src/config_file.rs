use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{DEFAULT_MAX_IN_FLIGHT, ExtractOptions, FetchStrategy};
use crate::worker::DEFAULT_WORKER_SRC;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub engine: Option<EngineConfig>,
    pub extraction: Option<ExtractionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub worker_src: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    Concurrent,
    Sequential,
}

/// Timeouts are in seconds; `0` disables the limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub strategy: Option<StrategyName>,
    pub max_in_flight: Option<usize>,
    pub read_timeout_secs: Option<u64>,
    pub open_timeout_secs: Option<u64>,
    pub page_timeout_secs: Option<u64>,
    pub release_timeout_secs: Option<u64>,
    pub notify_success: Option<bool>,
}

impl ConfigFile {
    /// Worker source to bootstrap the engine with.
    pub fn worker_src(&self) -> String {
        self.engine
            .as_ref()
            .and_then(|e| e.worker_src.clone())
            .unwrap_or_else(|| DEFAULT_WORKER_SRC.to_string())
    }

    /// Pipeline options with unset fields taken from [`ExtractOptions::default`].
    pub fn extract_options(&self) -> ExtractOptions {
        let defaults = ExtractOptions::default();
        let Some(ex) = self.extraction.as_ref() else {
            return defaults;
        };

        let strategy = match ex.strategy {
            Some(StrategyName::Sequential) => FetchStrategy::Sequential,
            Some(StrategyName::Concurrent) | None => FetchStrategy::Concurrent {
                max_in_flight: ex.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT).max(1),
            },
        };

        ExtractOptions {
            strategy,
            read_timeout: timeout_or(ex.read_timeout_secs, defaults.read_timeout),
            open_timeout: timeout_or(ex.open_timeout_secs, defaults.open_timeout),
            page_timeout: timeout_or(ex.page_timeout_secs, defaults.page_timeout),
            release_timeout: timeout_or(ex.release_timeout_secs, defaults.release_timeout),
            notify_success: ex.notify_success.unwrap_or(defaults.notify_success),
        }
    }
}

fn timeout_or(secs: Option<u64>, default: Option<Duration>) -> Option<Duration> {
    match secs {
        Some(0) => None,
        Some(s) => Some(Duration::from_secs(s)),
        None => default,
    }
}

/// Platform config directory path: `<config_dir>/pagetext/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pagetext").join("config.toml"))
}

/// Load config by cascading CWD `.pagetext.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".pagetext.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// First `Some` of `overlay` then `base`, after projecting each section.
fn pick<S, T>(overlay: Option<&S>, base: Option<&S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay.and_then(&field).or_else(|| base.and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (be, oe) = (base.engine.as_ref(), overlay.engine.as_ref());
    let (bx, ox) = (base.extraction.as_ref(), overlay.extraction.as_ref());

    ConfigFile {
        engine: Some(EngineConfig {
            worker_src: pick(oe, be, |e| e.worker_src.clone()),
        }),
        extraction: Some(ExtractionConfig {
            strategy: pick(ox, bx, |x| x.strategy),
            max_in_flight: pick(ox, bx, |x| x.max_in_flight),
            read_timeout_secs: pick(ox, bx, |x| x.read_timeout_secs),
            open_timeout_secs: pick(ox, bx, |x| x.open_timeout_secs),
            page_timeout_secs: pick(ox, bx, |x| x.page_timeout_secs),
            release_timeout_secs: pick(ox, bx, |x| x.release_timeout_secs),
            notify_success: pick(ox, bx, |x| x.notify_success),
        }),
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
