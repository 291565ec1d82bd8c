//! Tracing setup
//!
//! Installs a `tracing-subscriber` formatter for applications embedding the
//! engine. `RUST_LOG` takes precedence over the configured filter.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed, which leaves the
/// existing one in place.
pub fn init_tracing(default_filter: &str) -> bool {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let filter = EnvFilter::try_new(&env_filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter '{}': {}", env_filter, e);
        EnvFilter::new("info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
