//! Chat lifecycle state machine
//!
//! Owns the in-memory projection of every chat for its whole life
//! (active → ended) and enforces valid transitions and participant
//! authorization. All store I/O happens with no lock held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use crate::chat::{Chat, ChatMessage, ChatStatus};
use crate::error::AppError;
use crate::store::PersistenceGateway;
use crate::types::{ChatId, Slot, UserId};

/// Per-chat state machine and active-chat index
///
/// Holds chat projections plus a user → active chat index; the index is
/// what keeps a user out of the waiting pool while their chat lives.
pub struct ChatLifecycle {
    store: Arc<dyn PersistenceGateway>,
    chats: Mutex<HashMap<ChatId, Chat>>,
    active: Mutex<HashMap<UserId, ChatId>>,
}

impl ChatLifecycle {
    pub fn new(store: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            store,
            chats: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Create and persist a new active chat between two distinct users
    ///
    /// On a store failure nothing is recorded in memory; the caller
    /// compensates (the match engine re-enqueues both users).
    pub async fn create(&self, a: UserId, b: UserId) -> Result<Chat, AppError> {
        let chat = self.store.create_chat(a, b).await?;

        self.chats.lock().unwrap().insert(chat.id, chat.clone());
        {
            let mut active = self.active.lock().unwrap();
            active.insert(a, chat.id);
            active.insert(b, chat.id);
        }

        info!("Chat {} created", chat.id);
        Ok(chat)
    }

    /// Validate and persist a message into an active chat
    ///
    /// The sender must occupy exactly the slot they claim; a mismatch is
    /// rejected outright, never silently accepted.
    pub async fn post_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: String,
        sender_slot: Slot,
    ) -> Result<ChatMessage, AppError> {
        let chat = self.lookup(chat_id).await?;

        if !chat.is_active() {
            return Err(AppError::ChatNotActive);
        }
        if chat.participant(sender_slot) != sender_id {
            return Err(AppError::SenderMismatch);
        }

        self.store
            .create_message(chat_id, sender_id, content, sender_slot)
            .await
    }

    /// End a chat on behalf of one of its participants
    ///
    /// Idempotent: ending an already-ended chat is a logged no-op that
    /// returns the chat unchanged. On the active → ended transition the
    /// end time is recorded and both participants become available for
    /// matching again.
    pub async fn end(&self, chat_id: ChatId, requester_id: UserId) -> Result<Chat, AppError> {
        let chat = self.lookup(chat_id).await?;

        if !chat.contains(requester_id) {
            return Err(AppError::Unauthorized);
        }
        if !chat.is_active() {
            debug!("Chat {} already ended, no-op", chat_id);
            return Ok(chat);
        }

        let ended = self
            .store
            .update_chat_status(chat_id, ChatStatus::Ended, Some(Utc::now()))
            .await?;

        self.chats.lock().unwrap().insert(chat_id, ended.clone());
        {
            let mut active = self.active.lock().unwrap();
            for user in [ended.participant_a, ended.participant_b] {
                if active.get(&user) == Some(&chat_id) {
                    active.remove(&user);
                }
            }
        }

        info!("Chat {} ended by a participant", chat_id);
        Ok(ended)
    }

    /// The chat a user is currently in, if any
    pub fn active_chat_of(&self, user_id: UserId) -> Option<ChatId> {
        self.active.lock().unwrap().get(&user_id).copied()
    }

    /// In-memory snapshot of a chat
    pub fn get(&self, chat_id: ChatId) -> Option<Chat> {
        self.chats.lock().unwrap().get(&chat_id).cloned()
    }

    /// Projection lookup with store fallback
    async fn lookup(&self, chat_id: ChatId) -> Result<Chat, AppError> {
        if let Some(chat) = self.get(chat_id) {
            return Ok(chat);
        }
        self.store
            .find_chat(chat_id)
            .await?
            .ok_or_else(|| AppError::ChatNotFound(chat_id.to_string()))
    }
}
