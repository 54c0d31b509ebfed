//! Registry of connected sessions, keyed by player name

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::hooks::Notifier;

use super::protocol::ServerMsg;

/// Outbound channel of one connection
pub type SessionTx = mpsc::UnboundedSender<ServerMsg>;

/// Online sessions. Delivering to a name without a session is a no-op.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionTx>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`. Returns false if another connection already holds it.
    pub fn register(&self, name: &str, tx: SessionTx) -> bool {
        match self.sessions.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
                true
            }
        }
    }

    pub fn unregister(&self, name: &str) {
        self.sessions.remove(name);
    }

    pub fn send(&self, name: &str, msg: ServerMsg) -> bool {
        match self.sessions.get(name) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Notifier for SessionRegistry {
    fn deliver(&self, to: &str, text: &str) {
        if !self.send(to, ServerMsg::output(text)) {
            debug!(player = %to, "Dropped message for absent session");
        }
    }
}
