//! Message relay
//!
//! Pushes events from a chat to its participants' live connections.
//! An offline recipient is a normal condition: the message is already
//! durably persisted, so live delivery is simply skipped — no queuing,
//! no retry.

use std::sync::Arc;

use tracing::debug;

use crate::chat::{Chat, ChatMessage};
use crate::message::{MessagePayload, ServerMessage};
use crate::presence::PresenceRegistry;
use crate::types::UserId;

/// Delivers chat events to live connections via the presence registry
pub struct MessageRelay {
    presence: Arc<PresenceRegistry>,
}

impl MessageRelay {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// Push a message to the participant opposite its sender slot
    ///
    /// Never blocks on and never fails for an offline recipient.
    pub async fn deliver(&self, chat: &Chat, message: &ChatMessage) {
        let recipient = chat.participant(message.sender_slot.opposite());
        self.push(
            recipient,
            ServerMessage::MessageReceived {
                message: MessagePayload::from(message),
            },
        )
        .await;
    }

    /// Notify both participants that their chat has ended
    pub async fn deliver_ended(&self, chat: &Chat) {
        for user in [chat.participant_a, chat.participant_b] {
            self.push(
                user,
                ServerMessage::ChatEnded { chat_id: chat.id },
            )
            .await;
        }
    }

    async fn push(&self, user_id: UserId, event: ServerMessage) {
        let Some(entry) = self.presence.handle_of(user_id) else {
            debug!("Event for {} undeliverable (offline)", user_id);
            return;
        };
        // A closed channel means the user raced us offline; dropped.
        let _ = entry.send(event).await;
    }
}
