//! Structured logging setup.
//!
//! Concent's MiddleMan relay and Bankster run as a background service with no HTTP
//! surface of their own, so there's nothing here to export traces to — just
//! `tracing_subscriber`'s `fmt` layer, filtered by `RUST_LOG` (defaulting to `info`).

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. Call once, at the start of `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
