//! Lightweight tracing setup gated by LATENTBRIDGE_DEBUG=1.
use std::sync::OnceLock;

use tracing::Level;

static ENABLED: OnceLock<bool> = OnceLock::new();

pub fn is_enabled() -> bool {
    *ENABLED.get_or_init(|| {
        cfg!(feature = "debug-metrics")
            || std::env::var("LATENTBRIDGE_DEBUG").ok().as_deref() == Some("1")
    })
}

/// Install the stderr fmt subscriber. Warnings always show; `force_debug` (the `--debug`
/// flag) or the env switch lowers the level to debug. Safe to call more than once.
pub fn init_tracing(force_debug: bool) {
    let level = if force_debug || is_enabled() { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
