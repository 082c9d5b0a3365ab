// src/logging.rs
//! Tracing setup for the command line front end.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `ctupipe_core=debug`.
pub const LOG_ENV: &str = "CTUPIPE_LOG";

/// Initialize the global tracing subscriber.
///
/// Respects `CTUPIPE_LOG`; otherwise defaults to `info`, or `debug` when
/// `verbose` is set. Calling it twice is harmless (the second call is ignored).
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_thread_ids(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}
