//! Engine-side log output.
//!
//! An engine library opened at runtime links its own copy of `tracing`, so
//! its events never reach the host's subscriber. [`init`] gives the library a
//! fmt subscriber of its own unless one is already set, as happens when the
//! engine is linked into the host process.

use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_ENGINE_LOG: &str = "info";

/// Install the engine's subscriber if this copy of `tracing` has none.
pub fn init() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_ENGINE_LOG));

    // Loses only to a concurrent init, whose subscriber is equivalent.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
