//! Basic type definitions for the matching core
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`: stable user identifier issued by the external auth collaborator
//! - `ChatId`: unique identifier of a two-party chat
//! - `MessageId`: unique identifier of a single message
//!
//! Plus `Slot`, the anonymous A/B role label for chat participants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable user identifier (newtype pattern)
///
/// Issued by an external auth collaborator; the core never mints these
/// itself outside of tests. Implements Hash and Eq for HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random user ID (tests and local tooling)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from its string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique chat identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub Uuid);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anonymous participant role label
///
/// The only identity signal exchanged between matched users: each side
/// learns which slot it occupies, never the other side's user id.
/// Slot A is the primary slot (first of the drained pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The slot opposite this one
    pub fn opposite(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Whether this is the primary (A) slot
    pub fn is_primary(self) -> bool {
        matches!(self, Slot::A)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::A => write!(f, "A"),
            Slot::B => write!(f, "B"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_unique() {
        let id1 = UserId::new();
        let id2 = UserId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_user_id_parse_roundtrip() {
        let id = UserId::new();
        let parsed = UserId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_user_id_parse_rejects_garbage() {
        assert!(UserId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_slot_opposite() {
        assert_eq!(Slot::A.opposite(), Slot::B);
        assert_eq!(Slot::B.opposite(), Slot::A);
        assert!(Slot::A.is_primary());
        assert!(!Slot::B.is_primary());
    }
}
