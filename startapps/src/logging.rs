//! Diagnostic logging for driver runs.
//!
//! Progress lines, dropped answer records, validation failures, and protocol
//! rejections all go through `tracing` to stderr. They are the only error
//! report a run produces besides its exit code; rendered documents are the
//! product output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=startapps=debug startapps data.yaml out/
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
