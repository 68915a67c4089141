use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "Duet";

/// Length of a couple invite code
pub const COUPLE_CODE_LEN: usize = 6;

/// Alphabet used when generating couple codes.  Ambiguous glyphs
/// (0/O, 1/I/L) are excluded so codes survive being read aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Default color assigned to calendar events (hex RGB)
pub const DEFAULT_EVENT_COLOR: &str = "#FF6B9D";

/// Maximum event title length in characters
pub const MAX_EVENT_TITLE_LEN: usize = 255;

/// Maximum profile display-name length in characters
pub const MAX_PROFILE_NAME_LEN: usize = 100;

/// Minimum profile display-name length in characters
pub const MIN_PROFILE_NAME_LEN: usize = 2;

/// How long a received typing indicator stays visible without a
/// fresh signal from the sender.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// Delay between an inbound love note landing in the chat view and the
/// automatic read receipt, so the UI settles before the state flips.
pub const AUTO_READ_DELAY: Duration = Duration::from_millis(1000);
