//! Tracing setup for binaries built on ctrlwire.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` (for example `"ctrlwire=info"`) when
/// `RUST_LOG` is unset or invalid. Does nothing if a global subscriber is
/// already installed.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
