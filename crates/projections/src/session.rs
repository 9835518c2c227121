//! Live sessions that receive notifications as they are projected.
//!
//! Sessions are process-scoped: a recipient connected to another instance
//! only sees the entry when it next reads its feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use common::Actor;
use tokio::sync::mpsc;

use crate::notification::Notification;

pub type SessionId = u64;

/// A connected recipient. Notifications arrive on `receiver` until the
/// session is disconnected or the receiver is dropped.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub recipient: Actor,
    pub receiver: mpsc::UnboundedReceiver<Notification>,
}

pub trait SessionRegistry: Send + Sync {
    fn connect(&self, recipient: Actor) -> Session;

    /// Returns false if the session was unknown.
    fn disconnect(&self, id: SessionId) -> bool;

    /// Sends to every live session of `recipient`; returns how many got it.
    fn broadcast(&self, recipient: &Actor, notification: &Notification) -> usize;

    fn connected(&self) -> usize;
}

type Senders = HashMap<SessionId, (Actor, mpsc::UnboundedSender<Notification>)>;

#[derive(Debug, Clone, Default)]
pub struct InProcessSessions {
    sessions: Arc<Mutex<Senders>>,
    next_id: Arc<AtomicU64>,
}

impl InProcessSessions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for InProcessSessions {
    fn connect(&self, recipient: Actor) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (recipient.clone(), sender));
        tracing::debug!(session = id, recipient = %recipient, "session connected");

        Session {
            id,
            recipient,
            receiver,
        }
    }

    fn disconnect(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(session = id, "session disconnected");
        }
        removed
    }

    fn broadcast(&self, recipient: &Actor, notification: &Notification) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        sessions.retain(|_, (actor, sender)| {
            if actor != recipient {
                return !sender.is_closed();
            }
            match sender.send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    fn connected(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
