use thiserror::Error;

/// Errors surfaced by the client core and its backends.
///
/// Variants map one-to-one onto the failure modes the UI has to
/// distinguish; anything the caller cannot act on specifically ends up
/// in [`DuetError::Backend`].
#[derive(Error, Debug)]
pub enum DuetError {
    /// A mutation was attempted with no signed-in identity.
    #[error("Not signed in")]
    NotAuthenticated,

    /// The referenced couple / event / note does not exist.
    #[error("Record not found")]
    NotFound,

    /// No couple matches the invite code.
    #[error("Invalid couple code")]
    InvalidCode,

    /// The couple already has two members.
    #[error("This couple already has two members")]
    CoupleFull,

    /// Input rejected before any backend call was made.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The backing data contradicts itself (e.g. a profile points at a
    /// couple row that no longer exists).  Logged and degraded, never
    /// fatal to the caller.
    #[error("Data integrity: {0}")]
    Integrity(String),

    /// Transient network / backend failure with no more specific cause.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DuetError {
    /// Shorthand for a [`DuetError::Validation`] with a formatted message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a [`DuetError::Backend`] with a formatted message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
