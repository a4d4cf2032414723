//! ChatServer actor implementation
//!
//! The central actor forming the single coordination domain: every
//! connection event arrives here as a command over an mpsc channel.
//! The actor composes the presence registry, waiting pool, lifecycle,
//! match engine, and relay, all injected with a shared persistence
//! gateway so tests can instantiate isolated servers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::lifecycle::ChatLifecycle;
use crate::matcher::MatchEngine;
use crate::message::ServerMessage;
use crate::pool::WaitingPool;
use crate::presence::PresenceRegistry;
use crate::relay::MessageRelay;
use crate::store::PersistenceGateway;
use crate::types::{ChatId, UserId};

/// Commands sent from connection handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New authenticated connection
    Connect {
        user_id: UserId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection dropped (does NOT end an active chat)
    Disconnect { user_id: UserId },
    /// Enter the waiting pool
    EnterQueue { user_id: UserId },
    /// Send a message into a chat
    SendMessage {
        user_id: UserId,
        chat_id: ChatId,
        content: String,
    },
    /// End a chat
    EndChat { user_id: UserId, chat_id: ChatId },
    /// Periodic fallback match attempt
    MatchTick,
}

/// The main ChatServer actor
///
/// Processes commands from connection handlers serially; component
/// mutexes are never held across store I/O, so a slow store call only
/// delays the one command that issued it.
pub struct ChatServer {
    presence: Arc<PresenceRegistry>,
    pool: Arc<WaitingPool>,
    lifecycle: Arc<ChatLifecycle>,
    matcher: MatchEngine,
    relay: MessageRelay,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer over the given store and command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, store: Arc<dyn PersistenceGateway>) -> Self {
        let presence = Arc::new(PresenceRegistry::new(Arc::clone(&store)));
        let pool = Arc::new(WaitingPool::new());
        let lifecycle = Arc::new(ChatLifecycle::new(store));
        let matcher = MatchEngine::new(
            Arc::clone(&pool),
            Arc::clone(&lifecycle),
            Arc::clone(&presence),
        );
        let relay = MessageRelay::new(Arc::clone(&presence));
        Self {
            presence,
            pool,
            lifecycle,
            matcher,
            relay,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders
    /// are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { user_id, sender } => {
                self.handle_connect(user_id, sender).await;
            }
            ServerCommand::Disconnect { user_id } => {
                self.handle_disconnect(user_id).await;
            }
            ServerCommand::EnterQueue { user_id } => {
                self.handle_enter_queue(user_id).await;
            }
            ServerCommand::SendMessage {
                user_id,
                chat_id,
                content,
            } => {
                self.handle_send_message(user_id, chat_id, content).await;
            }
            ServerCommand::EndChat { user_id, chat_id } => {
                self.handle_end_chat(user_id, chat_id).await;
            }
            ServerCommand::MatchTick => {
                self.handle_match_tick().await;
            }
        }
    }

    /// Handle new connection: register presence, acknowledge
    async fn handle_connect(&mut self, user_id: UserId, sender: mpsc::Sender<ServerMessage>) {
        info!("User {} connected", user_id);
        self.presence.set_online(user_id, sender);

        if let Some(entry) = self.presence.handle_of(user_id) {
            let _ = entry
                .send(ServerMessage::Connected {
                    user_id: user_id.to_string(),
                })
                .await;
        }

        debug!("Online users: {}", self.presence.online_count());
    }

    /// Handle disconnection
    ///
    /// Cancels pool membership and presence immediately. An active chat
    /// is left running: disconnect is not end, the partner may keep
    /// sending until they end it themselves.
    async fn handle_disconnect(&mut self, user_id: UserId) {
        info!("User {} disconnected", user_id);
        self.pool.remove(user_id);
        self.presence.set_offline(user_id);

        debug!("Online users: {}", self.presence.online_count());
    }

    /// Handle queue entry
    ///
    /// A failed match attempt leaves both users waiting (they were
    /// re-enqueued); the failure is logged, not reported to the user,
    /// so retry stays transparent.
    async fn handle_enter_queue(&mut self, user_id: UserId) {
        if let Err(e) = self.matcher.enter_queue(user_id).await {
            warn!("Match attempt after enqueue of {} failed: {}", user_id, e);
        }
    }

    /// Handle a message submission
    async fn handle_send_message(&mut self, user_id: UserId, chat_id: ChatId, content: String) {
        // The sender's slot comes from the chat's own records, never
        // from client input.
        let Some(chat) = self.lifecycle.get(chat_id) else {
            self.reject(user_id, AppError::ChatNotFound(chat_id.to_string()))
                .await;
            return;
        };
        let Some(slot) = chat.slot_of(user_id) else {
            self.reject(user_id, AppError::Unauthorized).await;
            return;
        };

        match self
            .lifecycle
            .post_message(chat_id, user_id, content, slot)
            .await
        {
            Ok(message) => {
                self.relay.deliver(&chat, &message).await;
            }
            Err(e) => {
                self.reject(user_id, e).await;
            }
        }
    }

    /// Handle a chat end request
    async fn handle_end_chat(&mut self, user_id: UserId, chat_id: ChatId) {
        let was_active = self
            .lifecycle
            .get(chat_id)
            .map(|c| c.is_active())
            .unwrap_or(false);

        match self.lifecycle.end(chat_id, user_id).await {
            Ok(chat) => {
                // Notify only on the actual transition; a repeated end
                // is a no-op and must not re-emit events.
                if was_active && !chat.is_active() {
                    self.relay.deliver_ended(&chat).await;
                }
            }
            Err(e) => {
                self.reject(user_id, e).await;
            }
        }
    }

    /// Periodic fallback: drain the pool until no pair remains
    async fn handle_match_tick(&mut self) {
        loop {
            match self.matcher.try_match().await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    warn!("Fallback match attempt failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Report a rejected operation back to the requesting user
    async fn reject(&self, user_id: UserId, err: AppError) {
        debug!("Rejected operation from {}: {}", user_id, err);
        if let Some(entry) = self.presence.handle_of(user_id) {
            let _ = entry.send(err.into()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ErrorCode;
    use crate::store::MemoryStore;
    use crate::types::Slot;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn start_server() -> (mpsc::Sender<ServerCommand>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let gateway: Arc<dyn PersistenceGateway> = store.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(cmd_rx, gateway).run());
        (cmd_tx, store)
    }

    /// Connect a user and consume the Connected ack
    async fn connect(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        user_id: UserId,
    ) -> mpsc::Receiver<ServerMessage> {
        let (tx, mut rx) = mpsc::channel(16);
        cmd_tx
            .send(ServerCommand::Connect { user_id, sender: tx })
            .await
            .unwrap();
        match recv(&mut rx).await {
            ServerMessage::Connected { .. } => {}
            other => panic!("expected Connected, got {:?}", other),
        }
        rx
    }

    async fn match_pair(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        u1: UserId,
        u2: UserId,
        rx1: &mut mpsc::Receiver<ServerMessage>,
        rx2: &mut mpsc::Receiver<ServerMessage>,
    ) -> ChatId {
        cmd_tx
            .send(ServerCommand::EnterQueue { user_id: u1 })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::EnterQueue { user_id: u2 })
            .await
            .unwrap();

        let chat_id = match recv(rx1).await {
            ServerMessage::ChatMatched { chat_id, slot } => {
                assert_eq!(slot, Slot::A);
                chat_id
            }
            other => panic!("expected ChatMatched, got {:?}", other),
        };
        match recv(rx2).await {
            ServerMessage::ChatMatched { chat_id: id, slot } => {
                assert_eq!(id, chat_id);
                assert_eq!(slot, Slot::B);
            }
            other => panic!("expected ChatMatched, got {:?}", other),
        }
        chat_id
    }

    #[tokio::test]
    async fn test_scenario_queue_and_match() {
        let (cmd_tx, _store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;

        match_pair(&cmd_tx, u1, u2, &mut rx1, &mut rx2).await;

        // Exactly one match event each
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scenario_message_delivery() {
        let (cmd_tx, store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let u3 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;
        let mut rx3 = connect(&cmd_tx, u3).await;

        let chat_id = match_pair(&cmd_tx, u1, u2, &mut rx1, &mut rx2).await;

        cmd_tx
            .send(ServerCommand::SendMessage {
                user_id: u1,
                chat_id,
                content: "hello".to_string(),
            })
            .await
            .unwrap();

        match recv(&mut rx2).await {
            ServerMessage::MessageReceived { message } => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.chat_id, chat_id);
                assert_eq!(message.sender_slot, Slot::A);
            }
            other => panic!("expected MessageReceived, got {:?}", other),
        }
        // Exactly once, and to nobody else
        assert!(rx2.try_recv().is_err());
        assert!(rx1.try_recv().is_err());
        assert!(rx3.try_recv().is_err());

        // Durably persisted regardless of delivery
        assert_eq!(store.messages_of(chat_id).len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_end_chat() {
        let (cmd_tx, _store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;

        let chat_id = match_pair(&cmd_tx, u1, u2, &mut rx1, &mut rx2).await;

        cmd_tx
            .send(ServerCommand::EndChat { user_id: u1, chat_id })
            .await
            .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match recv(rx).await {
                ServerMessage::ChatEnded { chat_id: id } => assert_eq!(id, chat_id),
                other => panic!("expected ChatEnded, got {:?}", other),
            }
        }

        // A subsequent send on the ended chat is rejected
        cmd_tx
            .send(ServerCommand::SendMessage {
                user_id: u2,
                chat_id,
                content: "too late".to_string(),
            })
            .await
            .unwrap();
        match recv(&mut rx2).await {
            ServerMessage::Error { code, .. } => {
                assert!(matches!(code, ErrorCode::ChatNotActive));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_end_emits_no_second_event() {
        let (cmd_tx, _store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;

        let chat_id = match_pair(&cmd_tx, u1, u2, &mut rx1, &mut rx2).await;

        cmd_tx
            .send(ServerCommand::EndChat { user_id: u1, chat_id })
            .await
            .unwrap();
        let _ = recv(&mut rx1).await;
        let _ = recv(&mut rx2).await;

        // Idempotent repeat: success, but no events and no error frame.
        // A follow-up rejected operation acts as a fence: commands are
        // processed in order, so if the repeat had emitted anything it
        // would arrive before the ChatNotFound error.
        cmd_tx
            .send(ServerCommand::EndChat { user_id: u2, chat_id })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::SendMessage {
                user_id: u2,
                chat_id: ChatId::new(),
                content: "fence".to_string(),
            })
            .await
            .unwrap();
        match recv(&mut rx2).await {
            ServerMessage::Error { code, .. } => {
                assert!(matches!(code, ErrorCode::ChatNotFound));
            }
            other => panic!("expected only the fence error, got {:?}", other),
        }
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_end_by_outsider_rejected() {
        let (cmd_tx, _store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let intruder = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;
        let mut rx3 = connect(&cmd_tx, intruder).await;

        let chat_id = match_pair(&cmd_tx, u1, u2, &mut rx1, &mut rx2).await;

        cmd_tx
            .send(ServerCommand::EndChat {
                user_id: intruder,
                chat_id,
            })
            .await
            .unwrap();
        match recv(&mut rx3).await {
            ServerMessage::Error { code, .. } => {
                assert!(matches!(code, ErrorCode::Unauthorized));
            }
            other => panic!("expected Error, got {:?}", other),
        }
        // The chat is untouched
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_cancels_waiting() {
        let (cmd_tx, _store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let u3 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;
        let mut rx3 = connect(&cmd_tx, u3).await;

        cmd_tx
            .send(ServerCommand::EnterQueue { user_id: u1 })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::Disconnect { user_id: u1 })
            .await
            .unwrap();

        // u2 and u3 pair with each other, not with the departed u1
        let _chat_id = match_pair(&cmd_tx, u2, u3, &mut rx2, &mut rx3).await;
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_chat_rejected() {
        let (cmd_tx, _store) = start_server();
        let u1 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;

        cmd_tx
            .send(ServerCommand::SendMessage {
                user_id: u1,
                chat_id: ChatId::new(),
                content: "hi".to_string(),
            })
            .await
            .unwrap();
        match recv(&mut rx1).await {
            ServerMessage::Error { code, .. } => {
                assert!(matches!(code, ErrorCode::ChatNotFound));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_match_tick_drains_backlog() {
        let (cmd_tx, store) = start_server();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let mut rx1 = connect(&cmd_tx, u1).await;
        let mut rx2 = connect(&cmd_tx, u2).await;

        // Break the store so the enqueue-time match fails and both
        // users are left waiting.
        store.set_fail_writes(true);
        cmd_tx
            .send(ServerCommand::EnterQueue { user_id: u1 })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::EnterQueue { user_id: u2 })
            .await
            .unwrap();

        // Recovery: the periodic tick matches the backlog.
        store.set_fail_writes(false);
        cmd_tx.send(ServerCommand::MatchTick).await.unwrap();

        match recv(&mut rx1).await {
            ServerMessage::ChatMatched { .. } => {}
            other => panic!("expected ChatMatched, got {:?}", other),
        }
        match recv(&mut rx2).await {
            ServerMessage::ChatMatched { .. } => {}
            other => panic!("expected ChatMatched, got {:?}", other),
        }
    }
}
