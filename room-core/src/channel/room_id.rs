//! Room identifiers
//!
//! Room IDs are opaque to the room view (the backend hands them out), but they
//! end up in URLs and channel messages so they are validated on the way in.

use std::fmt;

/// Longest accepted room ID
const MAX_LENGTH: usize = 64;

/// A validated room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Parse a room ID from user input or a query string.
    ///
    /// Surrounding whitespace is trimmed. Only ASCII alphanumerics, `-` and
    /// `_` are allowed.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();

        if trimmed.is_empty() || trimmed.len() > MAX_LENGTH {
            return None;
        }

        if trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            Some(RoomId(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
