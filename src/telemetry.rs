//! Optional `tracing-subscriber` initialization for host applications that
//! don't already configure their own subscriber. Not required — the crate
//! emits `tracing` spans/events regardless of whether this is called.

#[cfg(feature = "telemetry-init")]
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
