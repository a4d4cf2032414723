//! Error types for the matching core
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal transport errors (connection termination), the
/// recoverable persistence failure, and the four client-facing
/// validation rejections.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Store unreachable or write failed (recoverable, triggers re-queue)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No chat with the given id
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// Chat exists but is no longer active
    #[error("Chat is not active")]
    ChatNotActive,

    /// Requester is not a participant of the chat
    #[error("Not a participant of this chat")]
    Unauthorized,

    /// Sender id does not match the claimed participant slot
    #[error("Sender does not match claimed slot")]
    SenderMismatch,
}

impl AppError {
    /// Whether this error is a client-facing rejection (reported back as
    /// an error frame) rather than a fatal transport condition.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::ChatNotFound(_)
                | AppError::ChatNotActive
                | AppError::Unauthorized
                | AppError::SenderMismatch
        )
    }
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
