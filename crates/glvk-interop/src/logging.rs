//! Log output for applications that have no subscriber of their own.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `GLVK_LOG=debug`.
pub const LOG_ENV: &str = "GLVK_LOG";

/// Install a formatting subscriber filtered by [`LOG_ENV`] (default `warn`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
