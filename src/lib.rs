//! Anonymous 1:1 chat matching and relay server
//!
//! Pairs previously-unacquainted online users into disposable two-party
//! chats over WebSocket, relays their messages in real time, and tears
//! each pairing down cleanly. Participants stay anonymous to each
//! other: the only identity signal exchanged is the A/B slot label.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor forming the single coordination domain
//! - Each connection has a `handler` task communicating with the server
//! - `WaitingPool` and `PresenceRegistry` are injected service objects,
//!   never globals, so tests instantiate isolated instances
//! - Durable storage sits behind the `PersistenceGateway` trait
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use anonpair::{ChatServer, MemoryStore, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx, Arc::new(MemoryStore::new())).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod chat;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod matcher;
pub mod message;
pub mod pool;
pub mod presence;
pub mod relay;
pub mod server;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use chat::{Chat, ChatMessage, ChatStatus};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use lifecycle::ChatLifecycle;
pub use matcher::MatchEngine;
pub use message::{ClientMessage, ErrorCode, MessagePayload, ServerMessage};
pub use pool::WaitingPool;
pub use presence::{PresenceEntry, PresenceRegistry};
pub use relay::MessageRelay;
pub use server::{ChatServer, ServerCommand};
pub use store::{MemoryStore, PersistenceGateway};
pub use types::{ChatId, MessageId, Slot, UserId};
