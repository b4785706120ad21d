//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.pairhub/config.json`) and environment.
//! Every field is optional; a missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Broker listener and policy settings.
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Broker bind, port, cleanup policy and identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Port for WebSocket and health HTTP (default 9988). Overridden by PAIRHUB_PORT env.
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_broker_bind")]
    pub bind: String,

    /// Re-registration and disconnect cleanup policy.
    #[serde(default)]
    pub policy: Policy,

    /// How a connection is turned into a registry key.
    #[serde(default)]
    pub identity: IdentityMode,
}

/// Re-registration and disconnect behaviour. The two variants are mutually exclusive
/// over the same state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Repeat registration is accepted without acknowledgment; app disconnect drops its bindings.
    Hard,

    /// Every registration is acknowledged and bound web peers are told the app is back;
    /// app disconnect keeps its bindings and tells bound web peers it is gone.
    #[default]
    Soft,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Hard => "hard",
            Policy::Soft => "soft",
        }
    }

    /// Whether a disconnecting app keeps its binding set for a later re-registration.
    pub fn retains_bindings(self) -> bool {
        matches!(self, Policy::Soft)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" => Ok(Policy::Hard),
            "soft" => Ok(Policy::Soft),
            other => Err(format!("unknown policy {:?} (expected \"hard\" or \"soft\")", other)),
        }
    }
}

/// Source of a connection's identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Remote IP only: a reconnecting peer keeps its identity, peers behind one NAT share it.
    #[default]
    Address,

    /// Remote IP and port: unique per live connection.
    Endpoint,
}

fn default_broker_port() -> u16 {
    9988
}

fn default_broker_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: default_broker_port(),
            bind: default_broker_bind(),
            policy: Policy::default(),
            identity: IdentityMode::default(),
        }
    }
}

/// Resolve the listen port: env PAIRHUB_PORT overrides config when it parses.
pub fn resolve_port(config: &Config) -> u16 {
    std::env::var("PAIRHUB_PORT")
        .ok()
        .and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or(config.broker.port)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PAIRHUB_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".pairhub").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, else the default path (or PAIRHUB_CONFIG_PATH).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&s).with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Parse config JSON text.
pub fn parse_config(s: &str) -> Result<Config> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_broker_port_and_bind() {
        let b = BrokerConfig::default();
        assert_eq!(b.port, 9988);
        assert_eq!(b.bind, "0.0.0.0");
        assert_eq!(b.policy, Policy::Soft);
        assert_eq!(b.identity, IdentityMode::Address);
    }

    #[test]
    fn empty_object_yields_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.broker.port, 9988);
        assert_eq!(config.broker.policy, Policy::Soft);
    }

    #[test]
    fn parses_policy_and_identity() {
        let config = parse_config(
            r#"{"broker":{"port":7000,"policy":"hard","identity":"endpoint"}}"#,
        )
        .unwrap();
        assert_eq!(config.broker.port, 7000);
        assert_eq!(config.broker.bind, "0.0.0.0");
        assert_eq!(config.broker.policy, Policy::Hard);
        assert_eq!(config.broker.identity, IdentityMode::Endpoint);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(parse_config(r#"{"broker":{"policy":"sticky"}}"#).is_err());
        assert!("sticky".parse::<Policy>().is_err());
        assert_eq!(" Hard ".parse::<Policy>(), Ok(Policy::Hard));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("pairhub-config-does-not-exist.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.broker.port, 9988);
    }
}
