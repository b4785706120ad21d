//! pairhub core library: configuration, connection identity, and the pairing-and-relay
//! broker used by the `pairhub` binary.

pub mod broker;
pub mod config;
pub mod identity;
pub mod init;
