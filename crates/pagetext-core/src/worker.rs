//! Worker bootstrap: point the engine at its background worker before parsing.

use crate::engine::DocumentEngine;

/// Versioned locator of the engine's background worker.
pub const DEFAULT_WORKER_SRC: &str = "builtin:mupdf-worker@0.6";

/// Configure the engine's worker source.
///
/// Returns `false`, with no side effect, when the engine is absent, exposes
/// no worker configuration, or `worker_src` is empty. Repeated calls store
/// the same value again.
pub fn ensure_worker_configured(engine: Option<&dyn DocumentEngine>, worker_src: &str) -> bool {
    let Some(engine) = engine else {
        tracing::error!("document engine is not loaded");
        return false;
    };
    let Some(options) = engine.worker_options() else {
        tracing::error!("document engine has no worker configuration; cannot set worker source");
        return false;
    };
    if worker_src.trim().is_empty() {
        tracing::error!("refusing to configure an empty worker source");
        return false;
    }

    options.set_worker_src(worker_src);
    tracing::debug!(worker_src, "worker source configured");
    true
}
