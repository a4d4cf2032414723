//! Chat and message domain structs
//!
//! A chat is a disposable two-party pairing with anonymous A/B slots.
//! Once ended it is terminal: never reopened, never reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MessageId, Slot, UserId};

/// Chat status
///
/// The `created` state of the lifecycle is transient: a chat is only
/// ever observable as Active (persisted) or Ended (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Active,
    Ended,
}

/// A two-party anonymous chat
///
/// Participants are recorded by slot; neither side ever learns the
/// other's user id. Invariant: participant_a != participant_b.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// Create a new active chat between two distinct users
    pub fn new(participant_a: UserId, participant_b: UserId) -> Self {
        debug_assert_ne!(participant_a, participant_b);
        Self {
            id: ChatId::new(),
            participant_a,
            participant_b,
            status: ChatStatus::Active,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ChatStatus::Active
    }

    /// The user occupying the given slot
    pub fn participant(&self, slot: Slot) -> UserId {
        match slot {
            Slot::A => self.participant_a,
            Slot::B => self.participant_b,
        }
    }

    /// The slot occupied by the given user, if they are a participant
    pub fn slot_of(&self, user_id: UserId) -> Option<Slot> {
        if self.participant_a == user_id {
            Some(Slot::A)
        } else if self.participant_b == user_id {
            Some(Slot::B)
        } else {
            None
        }
    }

    /// The other participant for a given user
    ///
    /// Returns None if the user is not in the chat.
    pub fn partner_of(&self, user_id: UserId) -> Option<UserId> {
        self.slot_of(user_id)
            .map(|slot| self.participant(slot.opposite()))
    }

    /// Check if a user is a participant of this chat
    pub fn contains(&self, user_id: UserId) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }
}

/// A single immutable chat message
///
/// `sender_slot` records which of the two anonymous participant slots
/// produced it; slot A is the primary slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub sender_slot: Slot,
}

impl ChatMessage {
    pub fn new(chat_id: ChatId, sender_id: UserId, content: String, sender_slot: Slot) -> Self {
        Self {
            id: MessageId::new(),
            chat_id,
            sender_id,
            content,
            sent_at: Utc::now(),
            sender_slot,
        }
    }
}
