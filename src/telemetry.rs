//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events; binaries and tests decide
//! where they go. [`init_tracing`] installs a plain fmt subscriber filtered by
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, which makes the
/// call safe to repeat from every test.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
