//! Tracing setup for embedding binaries.
//!
//! The core itself only emits `tracing` events; the front end that
//! embeds it calls [`init`] once at startup.

/// Install a global fmt subscriber honoring `RUST_LOG`, defaulting to
/// info with debug for the orchestrator.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bosun_rollout=debug".parse().unwrap()),
        )
        .init();
}
