//! Persistence gateway boundary
//!
//! The core never talks to a database directly; it consumes this trait.
//! `MemoryStore` is the in-process implementation used by the binary and
//! the test suite. A production deployment swaps in a database-backed
//! implementation behind the same trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::chat::{Chat, ChatMessage, ChatStatus};
use crate::error::AppError;
use crate::types::{ChatId, Slot, UserId};

/// Durable chat/message store consumed by the core
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist a new chat between two users, already in active status
    async fn create_chat(&self, a: UserId, b: UserId) -> Result<Chat, AppError>;

    /// Update a chat's status, recording the end time on termination
    async fn update_chat_status(
        &self,
        chat_id: ChatId,
        status: ChatStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Chat, AppError>;

    /// Persist a single message
    async fn create_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: String,
        sender_slot: Slot,
    ) -> Result<ChatMessage, AppError>;

    /// Look up a chat by id
    async fn find_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, AppError>;

    /// Record a user's online flag (and last-seen on going offline)
    async fn set_user_online(&self, user_id: UserId, online: bool) -> Result<(), AppError>;
}

/// In-process store backed by HashMaps
///
/// `fail_writes` lets tests force every write to return a persistence
/// error, exercising the match engine's re-enqueue compensation.
#[derive(Default)]
pub struct MemoryStore {
    chats: Mutex<HashMap<ChatId, Chat>>,
    messages: Mutex<Vec<ChatMessage>>,
    online: Mutex<HashMap<UserId, (bool, DateTime<Utc>)>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force all subsequent writes to fail (test hook)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(AppError::Persistence("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Messages stored for a chat, in insertion order (test inspection)
    pub fn messages_of(&self, chat_id: ChatId) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    /// Last recorded online flag for a user (test inspection)
    pub fn online_flag(&self, user_id: UserId) -> Option<bool> {
        self.online.lock().unwrap().get(&user_id).map(|(on, _)| *on)
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for MemoryStore {
    async fn create_chat(&self, a: UserId, b: UserId) -> Result<Chat, AppError> {
        self.check_writable()?;
        let chat = Chat::new(a, b);
        self.chats.lock().unwrap().insert(chat.id, chat.clone());
        debug!("Stored chat {}", chat.id);
        Ok(chat)
    }

    async fn update_chat_status(
        &self,
        chat_id: ChatId,
        status: ChatStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Chat, AppError> {
        self.check_writable()?;
        let mut chats = self.chats.lock().unwrap();
        let chat = chats
            .get_mut(&chat_id)
            .ok_or_else(|| AppError::ChatNotFound(chat_id.to_string()))?;
        chat.status = status;
        // ended_at is written once; the first termination wins
        if chat.ended_at.is_none() {
            chat.ended_at = ended_at;
        }
        Ok(chat.clone())
    }

    async fn create_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: String,
        sender_slot: Slot,
    ) -> Result<ChatMessage, AppError> {
        self.check_writable()?;
        let msg = ChatMessage::new(chat_id, sender_id, content, sender_slot);
        self.messages.lock().unwrap().push(msg.clone());
        Ok(msg)
    }

    async fn find_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, AppError> {
        Ok(self.chats.lock().unwrap().get(&chat_id).cloned())
    }

    async fn set_user_online(&self, user_id: UserId, online: bool) -> Result<(), AppError> {
        self.check_writable()?;
        self.online
            .lock()
            .unwrap()
            .insert(user_id, (online, Utc::now()));
        Ok(())
    }
}
