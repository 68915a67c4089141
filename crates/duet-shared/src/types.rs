use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CODE_ALPHABET, COUPLE_CODE_LEN};
use crate::error::DuetError;

macro_rules! uuid_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(
    /// Opaque identity of a signed-in user.  Issued by the external
    /// auth collaborator; the core never mints these itself outside of
    /// tests.
    UserId
);
uuid_newtype!(
    /// Identity of a couple.  Never changes after creation.
    CoupleId
);
uuid_newtype!(EventId);
uuid_newtype!(NoteId);
uuid_newtype!(MemoryId);

/// Topic name for a couple's ephemeral typing broadcast channel.
pub fn typing_topic(couple_id: CoupleId) -> String {
    format!("typing:{}", couple_id.0)
}

// ---------------------------------------------------------------------------
// Couple code
// ---------------------------------------------------------------------------

/// A couple's 6-character invite code, always stored uppercase.
///
/// Codes are matched case-insensitively: `"ab12cd"` and `"AB12CD"`
/// refer to the same couple.  Uniqueness is guaranteed by the backend
/// at creation time, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CoupleCode(String);

impl CoupleCode {
    /// Parse and normalize user input into a couple code.
    ///
    /// Accepts any case, rejects anything that is not exactly
    /// [`COUPLE_CODE_LEN`] ASCII alphanumeric characters.
    pub fn parse(input: &str) -> Result<Self, DuetError> {
        let trimmed = input.trim();
        if trimmed.len() != COUPLE_CODE_LEN {
            return Err(DuetError::validation(format!(
                "Couple code must be {COUPLE_CODE_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DuetError::validation(
                "Couple code may only contain letters and digits",
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Generate a random code from the unambiguous alphabet.
    ///
    /// Callers are responsible for retrying on collision against the
    /// backend's unique constraint.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..COUPLE_CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CoupleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Event kind
// ---------------------------------------------------------------------------

/// Category of a calendar event, mirroring the `event_type` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    Date,
    Anniversary,
    Todo,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Anniversary => "anniversary",
            Self::Todo => "todo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "date" => Some(Self::Date),
            "anniversary" => Some(Self::Anniversary),
            "todo" => Some(Self::Todo),
            _ => None,
        }
    }
}
