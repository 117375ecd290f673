//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. `CREWDESK_LOG` controls the
/// filter (`info` by default); calling twice is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_env("CREWDESK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
