//! Wire protocol definitions
//!
//! JSON-based bidirectional protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::error::AppError;
use crate::types::{ChatId, MessageId, Slot};

/// Client → Server operation
///
/// All operations a connected user may submit. Uses tagged enum with
/// snake_case naming. Disconnect is implicit (socket close).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the waiting pool to be matched with a stranger
    EnterQueue,
    /// Send a message into an active chat
    SendMessage { chat_id: ChatId, content: String },
    /// End an active chat
    EndChat { chat_id: ChatId },
}

/// Message payload as delivered to a recipient
///
/// Deliberately omits the sender's user id: the sender slot is the only
/// identity signal that ever crosses the wire.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub sender_slot: Slot,
}

impl From<&ChatMessage> for MessagePayload {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            message_id: msg.id,
            chat_id: msg.chat_id,
            content: msg.content.clone(),
            sent_at: msg.sent_at,
            sender_slot: msg.sender_slot,
        }
    }
}

/// Server → Client event
///
/// The three named outbound events plus the connection ack and error
/// frames. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted, presence registered
    Connected { user_id: String },
    /// A match was made; `slot` is the receiving user's own slot
    ChatMatched { chat_id: ChatId, slot: Slot },
    /// A message arrived from the chat partner
    MessageReceived { message: MessagePayload },
    /// The chat was ended (by either participant)
    ChatEnded { chat_id: ChatId },
    /// A submitted operation was rejected
    Error { code: ErrorCode, message: String },
}

/// Reason codes for ServerMessage::Error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No chat with the given id
    ChatNotFound,
    /// Chat exists but has ended
    ChatNotActive,
    /// Requester is not a participant
    Unauthorized,
    /// Sender does not match the claimed slot
    SenderMismatch,
    /// Store write failed; the operation did not take effect
    PersistenceFailed,
    /// Invalid message format
    InvalidMessage,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::ChatNotFound(chat_id) => {
                (ErrorCode::ChatNotFound, format!("Chat '{}' not found", chat_id))
            }
            AppError::ChatNotActive => {
                (ErrorCode::ChatNotActive, "Chat is not active".to_string())
            }
            AppError::Unauthorized => {
                (ErrorCode::Unauthorized, "Not a participant of this chat".to_string())
            }
            AppError::SenderMismatch => {
                (ErrorCode::SenderMismatch, "Sender does not match slot".to_string())
            }
            AppError::Persistence(_) => {
                (ErrorCode::PersistenceFailed, "Operation failed, try again".to_string())
            }
            AppError::Json(e) => {
                (ErrorCode::InvalidMessage, format!("Invalid message format: {}", e))
            }
            // Fatal errors are not typically converted (connection closes)
            _ => {
                (ErrorCode::InvalidMessage, "Internal error".to_string())
            }
        };
        ServerMessage::Error { code, message }
    }
}
