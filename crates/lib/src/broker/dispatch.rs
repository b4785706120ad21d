//! Broker context: owns the directory, binding table and both socket registries,
//! and routes every inbound request and disconnect through them.
//!
//! All methods take `&mut self` and run to completion; the server drives one `Broker`
//! from a single task so each event is applied atomically.

use crate::broker::bindings::BindingTable;
use crate::broker::directory::Directory;
use crate::broker::protocol::{self, AppEntry, MessageKind, Request};
use crate::broker::sockets::{deliver, PeerSender, SocketRegistry};
use crate::config::Policy;
use crate::identity::ConnectionIdentity;
use serde_json::Value;

pub struct Broker {
    policy: Policy,
    directory: Directory,
    bindings: BindingTable,
    app_sockets: SocketRegistry,
    web_sockets: SocketRegistry,
}

impl Broker {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            directory: Directory::new(),
            bindings: BindingTable::new(),
            app_sockets: SocketRegistry::new(),
            web_sockets: SocketRegistry::new(),
        }
    }

    /// Current directory snapshot.
    pub fn app_list(&self) -> Vec<AppEntry> {
        self.directory.list()
    }

    /// Number of connected app and web peers.
    pub fn peer_counts(&self) -> (usize, usize) {
        (self.app_sockets.len(), self.web_sockets.len())
    }

    /// Entry point for a parsed JSON frame from connection `id`; `reply` is that
    /// connection's own outbound channel. Malformed envelopes are dropped.
    pub fn handle_value(&mut self, id: &ConnectionIdentity, reply: &PeerSender, value: Value) {
        match Request::parse(value) {
            Ok(request) => self.handle_request(id, reply, request),
            Err(e) => log::debug!("dropping message from {}: {}", id, e),
        }
    }

    pub fn handle_request(&mut self, id: &ConnectionIdentity, reply: &PeerSender, request: Request) {
        match request.kind() {
            MessageKind::RegisterApp => self.register_app(id, reply, &request),
            MessageKind::UnregisterApp => self.unregister_app(id, reply, &request),
            MessageKind::BindApp => self.bind_app(id, reply, &request),
            MessageKind::UnbindApp => self.unbind_app(id, reply, &request),
            MessageKind::AppList => self.send_app_list(id, reply, &request),
            MessageKind::ForwardAppMessage => self.forward_app_message(id, &request),
            MessageKind::ForwardWebMessage => self.forward_web_message(id, &request),
            MessageKind::Unknown => {
                log::debug!("ignoring unknown message {:?} from {}", request.name(), id)
            }
        }
    }

    fn register_app(&mut self, id: &ConnectionIdentity, reply: &PeerSender, request: &Request) {
        let already_registered = self.bindings.ensure_binding_set(id);
        self.app_sockets.insert(id.clone(), reply.clone());
        self.directory.register(id.clone(), request.info().cloned());
        log::info!("register app {} (repeat={})", id, already_registered);

        match self.policy {
            Policy::Hard if already_registered => {
                log::debug!("repeat registration from {} not acknowledged", id);
            }
            Policy::Hard => {
                deliver(reply, request.ack(), id);
            }
            Policy::Soft => {
                deliver(reply, request.ack(), id);
                let notice = protocol::bound_notice(id);
                for web in self.bindings.members_of(id) {
                    if self.web_sockets.send(&web, notice.clone()) {
                        log::info!("rebound web {} to app {}", web, id);
                    }
                }
            }
        }
    }

    fn unregister_app(&mut self, id: &ConnectionIdentity, reply: &PeerSender, request: &Request) {
        log::info!("unregister app {}", id);
        self.remove_app(id, true);
        deliver(reply, request.ack(), id);
    }

    fn bind_app(&mut self, id: &ConnectionIdentity, reply: &PeerSender, request: &Request) {
        let app = match request.bind_target() {
            Ok(app) => app,
            Err(e) => {
                log::debug!("dropping bind from {}: {}", id, e);
                return;
            }
        };
        self.web_sockets.insert(id.clone(), reply.clone());
        if self.bindings.bind(&app, id) {
            log::info!("bind web {} to app {}", id, app);
            deliver(reply, request.ack(), id);
        } else {
            log::debug!("bind from {} to unknown app {} ignored", id, app);
        }
    }

    fn unbind_app(&mut self, id: &ConnectionIdentity, reply: &PeerSender, request: &Request) {
        let apps = self.bindings.unbind_web(id, true);
        self.web_sockets.remove(id);
        log::info!("unbind web {} from {} app(s)", id, apps.len());
        deliver(reply, request.ack(), id);
    }

    fn send_app_list(&self, id: &ConnectionIdentity, reply: &PeerSender, request: &Request) {
        match request.app_list_reply(&self.directory.list()) {
            Ok(response) => {
                deliver(reply, response, id);
            }
            Err(e) => log::warn!("app list for {}: {}", id, e),
        }
    }

    fn forward_app_message(&self, id: &ConnectionIdentity, request: &Request) {
        let message = request.forwarded();
        for web in self.bindings.members_of(id) {
            self.web_sockets.send(&web, message.clone());
        }
    }

    fn forward_web_message(&self, id: &ConnectionIdentity, request: &Request) {
        let message = request.forwarded();
        for app in self.bindings.apps_bound_to(id) {
            self.app_sockets.send(&app, message.clone());
        }
    }

    /// Cleanup when connection `id` closes; `closing` is that connection's outbound channel.
    /// Only the registration held by this same channel is removed, so a stale connection
    /// closing late leaves a newer connection under the same identity untouched. App peers
    /// take precedence over web peers sharing the channel; anything else is a no-op.
    pub fn handle_close(&mut self, id: &ConnectionIdentity, closing: &PeerSender) {
        if self.app_sockets.is_current(id, closing) {
            let retain = self.policy.retains_bindings();
            log::info!("app {} disconnected (bindings retained={})", id, retain);
            self.remove_app(id, !retain);
            if retain {
                let notice = protocol::unbound_notice(id);
                for web in self.bindings.members_of(id) {
                    self.web_sockets.send(&web, notice.clone());
                }
            }
        } else if self.web_sockets.is_current(id, closing) {
            log::info!("web {} disconnected", id);
            self.web_sockets.remove(id);
            self.bindings.unbind_web(id, true);
        } else {
            log::debug!("client {} disconnected without a live registration", id);
        }
    }

    fn remove_app(&mut self, id: &ConnectionIdentity, drop_binding_set: bool) {
        self.bindings.on_app_removed(id, drop_binding_set);
        self.app_sockets.remove(id);
        self.directory.unregister(id);
    }
}
