//! Development helper: initialize a tracing subscriber when `RUST_LOG` is set.
//!
//! Tests and host shims can call `tether::dev_tracing::init_tracing()` to see
//! the bridge's `[LIFECYCLE]`, `[SEND]`, `[RECV]` and `[POLL]` events. This is
//! a no-op when `RUST_LOG` is not set or when a global subscriber is already
//! installed.

/// Install an env-filtered fmt subscriber if `RUST_LOG` is set.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        // Best-effort: a host may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Install a subscriber at `directive` (for example `"tether_core=debug"`),
/// unless one is already installed.
pub fn init_with(directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(directive))
        .try_init();
}
