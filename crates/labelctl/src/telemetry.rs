//! Structured logging initialisation for the CLI.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber sized to the verbosity flag.
///
/// Diagnostics go to stderr so they never mix with rendered results.
/// Repeated calls are idempotent; only the first installs anything.
pub(crate) fn initialise(verbosity: u8) {
    TELEMETRY_GUARD.get_or_init(|| {
        let filter = match verbosity {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .without_time()
            .try_init();
    });
}
