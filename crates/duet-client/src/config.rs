//! Tunable client behavior.

use std::time::Duration;

use duet_shared::constants::{AUTO_READ_DELAY, TYPING_EXPIRY};

/// Timing knobs for the reactive stores.  The defaults match the
/// shipped product; tests shorten them or drive the paused clock.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a partner's typing indicator stays visible without a
    /// fresh signal.
    pub typing_expiry: Duration,
    /// Delay before an inbound note visible in the chat view is
    /// automatically marked read.
    pub auto_read_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            typing_expiry: TYPING_EXPIRY,
            auto_read_delay: AUTO_READ_DELAY,
        }
    }
}
