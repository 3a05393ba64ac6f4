//! Acceptor configuration.
//!
//! Settings come from an optional `broker.toml` (or an explicitly named
//! file) overlaid with `BROKER_`-prefixed environment variables; every
//! field has a default so the binary runs with no configuration at all.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Interface the acceptor binds.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// TCP port the acceptor listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Identity the server answers to; inbound tag 56 must match and
    /// outbound tag 49 carries it.
    #[serde(default = "default_server_comp_id")]
    pub server_comp_id: String,

    /// Heartbeat interval assumed before a client proposes one at logon.
    #[serde(default = "default_heartbeat_s")]
    pub default_heartbeat_s: u64,

    /// A session with no inbound bytes for `multiplier * heartbeat` seconds
    /// is torn down.
    #[serde(default = "default_idle_timeout_multiplier")]
    pub idle_timeout_multiplier: f64,

    /// Cap on concurrent sessions; `None` means unbounded.
    #[serde(default)]
    pub max_sessions: Option<usize>,

    /// How long existing sessions get to log out at shutdown.
    #[serde(default = "default_shutdown_grace_s")]
    pub shutdown_grace_s: u64,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    15001
}
fn default_server_comp_id() -> String {
    "BROKER".to_string()
}
fn default_heartbeat_s() -> u64 {
    30
}
fn default_idle_timeout_multiplier() -> f64 {
    2.4
}
fn default_shutdown_grace_s() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            server_comp_id: default_server_comp_id(),
            default_heartbeat_s: default_heartbeat_s(),
            idle_timeout_multiplier: default_idle_timeout_multiplier(),
            max_sessions: None,
            shutdown_grace_s: default_shutdown_grace_s(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `broker.toml` next to the binary, if
    /// present) with `BROKER_*` environment overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(p) => builder.add_source(File::with_name(p)),
            None => builder.add_source(File::with_name("broker").required(false)),
        };
        builder
            .add_source(Environment::with_prefix("BROKER"))
            .build()?
            .try_deserialize()
    }

    /// Address string for the listen socket.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Inbound idle window for a session running at `heartbeat_s`.
    pub fn idle_timeout(&self, heartbeat_s: u64) -> Duration {
        Duration::from_secs_f64(heartbeat_s as f64 * self.idle_timeout_multiplier)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.listen_host, "0.0.0.0");
        assert_eq!(s.listen_port, 15001);
        assert_eq!(s.server_comp_id, "BROKER");
        assert_eq!(s.default_heartbeat_s, 30);
        assert_eq!(s.idle_timeout_multiplier, 2.4);
        assert_eq!(s.max_sessions, None);
    }

    #[test]
    fn test_idle_timeout_scales_with_heartbeat() {
        let s = Settings::default();
        assert_eq!(s.idle_timeout(30), Duration::from_secs_f64(72.0));
        assert_eq!(s.idle_timeout(5), Duration::from_secs_f64(12.0));
    }

    #[test]
    fn test_bind_addr() {
        let s = Settings {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 9001,
            ..Settings::default()
        };
        assert_eq!(s.bind_addr(), "127.0.0.1:9001");
    }
}
