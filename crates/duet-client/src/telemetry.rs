//! Tracing setup for binaries embedding the client core.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber.  `RUST_LOG` wins when set;
/// otherwise the client and store crates log at debug/info and
/// everything else at warn.  Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("duet_client=debug,duet_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
