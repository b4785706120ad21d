//! Socket registry: identity -> outbound channel of a live connection.

use crate::identity::ConnectionIdentity;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Sender half of a connection's outbound queue. The socket task drains the
/// receiver and writes each value as a text frame.
pub type PeerSender = mpsc::UnboundedSender<Value>;

/// Lookup table used to resolve where a reply, forward or notification goes.
/// The broker keeps one for app peers and one for web peers.
#[derive(Default)]
pub struct SocketRegistry {
    inner: HashMap<ConnectionIdentity, PeerSender>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the channel for `id`.
    pub fn insert(&mut self, id: ConnectionIdentity, sender: PeerSender) {
        self.inner.insert(id, sender);
    }

    pub fn remove(&mut self, id: &ConnectionIdentity) -> Option<PeerSender> {
        self.inner.remove(id)
    }

    /// Whether `id` is registered through this very channel (not just any channel
    /// under the same identity).
    pub fn is_current(&self, id: &ConnectionIdentity, sender: &PeerSender) -> bool {
        self.inner
            .get(id)
            .is_some_and(|registered| registered.same_channel(sender))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Best-effort delivery. Returns false when `id` is unknown or its channel is closed.
    pub fn send(&self, id: &ConnectionIdentity, message: Value) -> bool {
        let Some(sender) = self.inner.get(id) else {
            return false;
        };
        deliver(sender, message, id)
    }
}

/// Push onto a connection's queue; a closed queue is logged and otherwise ignored.
pub fn deliver(sender: &PeerSender, message: Value, id: &ConnectionIdentity) -> bool {
    if sender.send(message).is_err() {
        log::debug!("dropping message for {}: connection closed", id);
        return false;
    }
    true
}
