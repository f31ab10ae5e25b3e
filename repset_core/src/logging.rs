//! Tracing setup shared by the repset binary and tests.
//!
//! Logs go to stderr so that command output on stdout stays clean for
//! scripting. `RUST_LOG` always wins over the level picked here.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter for a `-v` count: warn, then info, then debug
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber with `default_level` as the fallback filter.
///
/// Calling it again is harmless; the first subscriber stays.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Debug-level logging captured by the test harness
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
