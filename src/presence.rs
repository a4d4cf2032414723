//! Presence registry
//!
//! Tracks which users currently have a live connection and the channel
//! to deliver events through. An explicit injected service object, not
//! a process-wide global, so tests instantiate isolated registries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::store::PersistenceGateway;
use crate::types::UserId;

/// A live connection's delivery handle
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    /// Server → Client event channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// When this connection registered
    pub online_since: DateTime<Utc>,
}

impl PresenceEntry {
    /// Send an event to this connection
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Registry of currently connected users
///
/// At most one live handle per user: a reconnect replaces the prior
/// handle and the old receiver sees its channel close. The mutex is
/// only held for map mutation, never across an await.
pub struct PresenceRegistry {
    entries: Mutex<HashMap<UserId, PresenceEntry>>,
    store: Arc<dyn PersistenceGateway>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Register or replace the delivery handle for a user
    ///
    /// The external user-store is updated fire-and-forget; delivery
    /// never waits on it.
    pub fn set_online(&self, user_id: UserId, sender: mpsc::Sender<ServerMessage>) {
        let entry = PresenceEntry {
            sender,
            online_since: Utc::now(),
        };
        let replaced = self
            .entries
            .lock()
            .unwrap()
            .insert(user_id, entry)
            .is_some();
        if replaced {
            debug!("Replaced live handle for {}", user_id);
        }

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.set_user_online(user_id, true).await {
                warn!("Failed to mark {} online in store: {}", user_id, e);
            }
        });
    }

    /// Remove a user's delivery handle
    ///
    /// The store records the offline flag with a last-seen timestamp,
    /// again fire-and-forget.
    pub fn set_offline(&self, user_id: UserId) {
        self.entries.lock().unwrap().remove(&user_id);

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.set_user_online(user_id, false).await {
                warn!("Failed to mark {} offline in store: {}", user_id, e);
            }
        });
    }

    /// Look up a user's delivery handle; absent means "deliver nothing"
    pub fn handle_of(&self, user_id: UserId) -> Option<PresenceEntry> {
        self.entries.lock().unwrap().get(&user_id).cloned()
    }

    /// Number of currently connected users
    pub fn online_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_online_offline() {
        let reg = registry();
        let user = UserId::new();
        let (tx, _rx) = mpsc::channel(8);

        assert!(reg.handle_of(user).is_none());

        reg.set_online(user, tx);
        assert!(reg.handle_of(user).is_some());
        assert_eq!(reg.online_count(), 1);

        reg.set_offline(user);
        assert!(reg.handle_of(user).is_none());
        assert_eq!(reg.online_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_handle() {
        let reg = registry();
        let user = UserId::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);

        reg.set_online(user, tx1);
        reg.set_online(user, tx2);
        assert_eq!(reg.online_count(), 1);

        // Delivery goes to the newer connection only
        let entry = reg.handle_of(user).unwrap();
        entry
            .send(ServerMessage::Connected {
                user_id: user.to_string(),
            })
            .await
            .unwrap();

        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_closed_channel_errors() {
        let reg = registry();
        let user = UserId::new();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        reg.set_online(user, tx);
        let entry = reg.handle_of(user).unwrap();
        let res = entry
            .send(ServerMessage::Connected {
                user_id: user.to_string(),
            })
            .await;
        assert!(matches!(res, Err(SendError::ChannelClosed)));
    }
}
