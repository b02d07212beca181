use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "AOTC_LOG";

const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Installs the global fmt subscriber. Safe to call more than once.
pub fn init_logging() {
    init_logging_with(false);
}

/// Like [`init_logging`]; `verbose` forces the `debug` level regardless of `AOTC_LOG`.
pub fn init_logging_with(verbose: bool) {
    INIT.call_once(|| {
        let filter = if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        };

        // An embedding application may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
