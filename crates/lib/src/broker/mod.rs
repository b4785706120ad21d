//! Broker: pairing and relay between app peers and web peers.
//!
//! App peers register in the directory; web peers list the directory and bind to one app;
//! bound peers then exchange opaque messages through the broker. One task owns all
//! registries, fed by per-connection socket tasks.

mod bindings;
mod directory;
mod dispatch;
pub mod protocol;
mod server;
mod sockets;

pub use bindings::BindingTable;
pub use directory::Directory;
pub use dispatch::Broker;
pub use protocol::{AppEntry, MessageKind, ProtocolError, Request};
pub use server::{run_broker, serve, shutdown_signal, BrokerEvent, BrokerHandle, BrokerSnapshot};
pub use sockets::{PeerSender, SocketRegistry};
