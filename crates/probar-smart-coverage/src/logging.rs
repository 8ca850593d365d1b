//! Tracing subscriber setup for hosts that do not install their own.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a compact fmt subscriber filtered by `RUST_LOG`
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Install a JSON subscriber, one event per line
///
/// Returns `false` if a global subscriber was already set.
pub fn init_json_tracing() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}
