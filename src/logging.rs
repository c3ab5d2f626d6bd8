//! `tracing` subscriber setup shared by both binaries (§2.2).

use tracing_subscriber::EnvFilter;

/// Initialize a stderr-writing fmt subscriber, honoring `RUST_LOG` and
/// falling back to `info` for this crate's own targets. Call once, at the
/// top of `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
