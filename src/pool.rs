//! Waiting pool
//!
//! The set of users currently seeking a match, in strict FIFO insertion
//! order. Drain is atomic under the pool mutex: two concurrent enqueues
//! can never both pair against the same third user.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::types::UserId;

#[derive(Default)]
struct PoolInner {
    order: VecDeque<UserId>,
    members: HashSet<UserId>,
}

/// FIFO pool of users waiting to be matched
///
/// A user appears at most once. Membership implies the user is online
/// and not in an active chat; the active-chat check lives with the
/// caller (the match engine queries the chat lifecycle before adding).
#[derive(Default)]
pub struct WaitingPool {
    inner: Mutex<PoolInner>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the back of the pool
    ///
    /// Idempotent: returns false without reordering if already present.
    pub fn enqueue(&self, user_id: UserId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.members.insert(user_id) {
            debug!("{} already waiting", user_id);
            return false;
        }
        inner.order.push_back(user_id);
        true
    }

    /// Atomically remove and return the two earliest-enqueued users
    ///
    /// Returns None when fewer than two users are waiting.
    pub fn drain_pair(&self) -> Option<(UserId, UserId)> {
        let mut inner = self.inner.lock().unwrap();
        if inner.order.len() < 2 {
            return None;
        }
        let first = inner.order.pop_front()?;
        let second = inner.order.pop_front()?;
        inner.members.remove(&first);
        inner.members.remove(&second);
        Some((first, second))
    }

    /// Remove a user (disconnect or explicit cancel); idempotent
    pub fn remove(&self, user_id: UserId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.members.remove(&user_id) {
            inner.order.retain(|u| *u != user_id);
        }
    }

    /// Whether a user is currently waiting
    pub fn contains(&self, user_id: UserId) -> bool {
        self.inner.lock().unwrap().members.contains(&user_id)
    }

    /// Number of waiting users
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
