//! Structured logging bootstrap shared by every binary. Mirrors
//! `drewalth-irrigation`'s `crates/hub/src/main.rs` verbatim: `RUST_LOG` via
//! `EnvFilter`, falling back to `info`.

/// Installs the global `tracing` subscriber. Call once, at the top of
/// `main`, before anything else logs.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
