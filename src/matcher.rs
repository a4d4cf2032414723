//! Match engine
//!
//! Drains the waiting pool pairwise and turns each pair into a chat.
//! Runs after every enqueue and periodically as a fallback tick. The
//! pool drain is atomic, so no user can land in two concurrent pairs.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat::Chat;
use crate::error::AppError;
use crate::lifecycle::ChatLifecycle;
use crate::message::ServerMessage;
use crate::pool::WaitingPool;
use crate::presence::PresenceRegistry;
use crate::types::{Slot, UserId};

/// Pairs waiting users into chats and announces the match
pub struct MatchEngine {
    pool: Arc<WaitingPool>,
    lifecycle: Arc<ChatLifecycle>,
    presence: Arc<PresenceRegistry>,
}

impl MatchEngine {
    pub fn new(
        pool: Arc<WaitingPool>,
        lifecycle: Arc<ChatLifecycle>,
        presence: Arc<PresenceRegistry>,
    ) -> Self {
        Self {
            pool,
            lifecycle,
            presence,
        }
    }

    /// Admit a user to the waiting pool and attempt a match
    ///
    /// Refused (no-op) while the user still has an active chat; they
    /// become eligible again the moment that chat ends.
    pub async fn enter_queue(&self, user_id: UserId) -> Result<Option<Chat>, AppError> {
        if let Some(chat_id) = self.lifecycle.active_chat_of(user_id) {
            debug!("{} tried to queue while in chat {}", user_id, chat_id);
            return Ok(None);
        }
        if self.pool.enqueue(user_id) {
            debug!("{} entered the waiting pool", user_id);
        }
        self.try_match().await
    }

    /// Drain one pair and create their chat
    ///
    /// On a store failure both users are re-enqueued once, best effort,
    /// and the error is surfaced rather than swallowed. A user who
    /// disconnected between drain and failure is dropped by the
    /// re-enqueue path the same way any stale pool entry would be:
    /// their next drain finds no live handle and the match event is
    /// simply undeliverable.
    pub async fn try_match(&self) -> Result<Option<Chat>, AppError> {
        let Some((a, b)) = self.pool.drain_pair() else {
            return Ok(None);
        };

        // No pool lock is held here; the drained pair is ours alone.
        let chat = match self.lifecycle.create(a, b).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!("Chat creation for drained pair failed, re-enqueueing: {}", e);
                self.pool.enqueue(a);
                self.pool.enqueue(b);
                return Err(e);
            }
        };

        info!("Matched two users into chat {}", chat.id);

        // Each side learns only its own slot, never the partner's id.
        self.announce(a, &chat, Slot::A).await;
        self.announce(b, &chat, Slot::B).await;

        Ok(Some(chat))
    }

    async fn announce(&self, user_id: UserId, chat: &Chat, slot: Slot) {
        let Some(entry) = self.presence.handle_of(user_id) else {
            debug!("Match event for {} undeliverable (offline)", user_id);
            return;
        };
        let _ = entry
            .send(ServerMessage::ChatMatched {
                chat_id: chat.id,
                slot,
            })
            .await;
    }
}
