//! Input validation applied before any backend round trip.

use crate::constants::{MAX_EVENT_TITLE_LEN, MAX_PROFILE_NAME_LEN, MIN_PROFILE_NAME_LEN};
use crate::error::DuetError;
use crate::models::{NewEvent, NewMemory};

/// Validate an event title: required, at most 255 characters.
pub fn event_title(title: &str) -> Result<(), DuetError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DuetError::validation("Event title is required"));
    }
    if trimmed.chars().count() > MAX_EVENT_TITLE_LEN {
        return Err(DuetError::validation("Event title is too long"));
    }
    Ok(())
}

/// Validate a display color: `#RRGGBB`, hex digits, case-insensitive.
pub fn hex_color(color: &str) -> Result<(), DuetError> {
    let ok = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if ok {
        Ok(())
    } else {
        Err(DuetError::validation("Invalid color"))
    }
}

/// Validate a profile display name: 2 to 100 characters.
pub fn profile_name(name: &str) -> Result<(), DuetError> {
    let len = name.trim().chars().count();
    if len < MIN_PROFILE_NAME_LEN {
        return Err(DuetError::validation(
            "Name must contain at least 2 characters",
        ));
    }
    if len > MAX_PROFILE_NAME_LEN {
        return Err(DuetError::validation("Name is too long"));
    }
    Ok(())
}

/// Validate a love-note body: must contain something other than
/// whitespace.
pub fn note_message(message: &str) -> Result<(), DuetError> {
    if message.trim().is_empty() {
        return Err(DuetError::validation("Message cannot be empty"));
    }
    Ok(())
}

/// Validate every field of a new event in one pass.
pub fn new_event(event: &NewEvent) -> Result<(), DuetError> {
    event_title(&event.title)?;
    hex_color(&event.color)?;
    Ok(())
}

/// Validate every field of a new memory in one pass.
pub fn new_memory(memory: &NewMemory) -> Result<(), DuetError> {
    event_title(&memory.title)?;
    Ok(())
}
