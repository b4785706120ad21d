//! Connection identity: the registry key derived from a connection's remote address.

use crate::config::IdentityMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Opaque, comparable key for a connected peer. Serializes as a plain string
/// (the `clientId` seen by clients).
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionIdentity(String);

impl ConnectionIdentity {
    /// Derive the identity for a connection from its remote address.
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are reduced to plain IPv4.
    pub fn resolve(remote: SocketAddr, mode: IdentityMode) -> Self {
        let ip = normalize_ip(remote.ip());
        match mode {
            IdentityMode::Address => Self(ip.to_string()),
            IdentityMode::Endpoint => Self(SocketAddr::new(ip, remote.port()).to_string()),
        }
    }

    /// Identity named by a client, e.g. the target of a bind request. Applies the same
    /// prefix normalization when the text is an address.
    pub fn from_client(s: &str) -> Self {
        let s = s.trim();
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Self(normalize_ip(ip).to_string());
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Self(SocketAddr::new(normalize_ip(addr.ip()), addr.port()).to_string());
        }
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn address_mode_strips_mapped_prefix() {
        let id = ConnectionIdentity::resolve(addr("[::ffff:10.0.0.5]:51000"), IdentityMode::Address);
        assert_eq!(id.as_str(), "10.0.0.5");
    }

    #[test]
    fn address_mode_ignores_port() {
        let a = ConnectionIdentity::resolve(addr("10.0.0.5:1000"), IdentityMode::Address);
        let b = ConnectionIdentity::resolve(addr("[::ffff:10.0.0.5]:2000"), IdentityMode::Address);
        assert_eq!(a, b);
    }

    #[test]
    fn endpoint_mode_keeps_port() {
        let a = ConnectionIdentity::resolve(addr("[::ffff:10.0.0.5]:1000"), IdentityMode::Endpoint);
        let b = ConnectionIdentity::resolve(addr("10.0.0.5:2000"), IdentityMode::Endpoint);
        assert_eq!(a.as_str(), "10.0.0.5:1000");
        assert_ne!(a, b);
    }

    #[test]
    fn plain_ipv6_is_untouched() {
        let id = ConnectionIdentity::resolve(addr("[2001:db8::1]:80"), IdentityMode::Address);
        assert_eq!(id.as_str(), "2001:db8::1");
    }

    #[test]
    fn client_named_identity_is_normalized() {
        assert_eq!(ConnectionIdentity::from_client("::ffff:10.0.0.5").as_str(), "10.0.0.5");
        assert_eq!(
            ConnectionIdentity::from_client("[::ffff:10.0.0.5]:9000").as_str(),
            "10.0.0.5:9000"
        );
        assert_eq!(ConnectionIdentity::from_client("device-7").as_str(), "device-7");
    }
}
