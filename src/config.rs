//! Process configuration, read from flags/env the way `rtldg-simulcast-mpv`
//! wires its client/server split: `clap` derive with `env` fallbacks, plus
//! `dotenvy` for local `.env` loading. Nothing here is ever read from disk
//! state at runtime beyond process startup — this governs only this
//! process's own bind address and secret, not the embedding application's
//! room/token configuration.

use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

/// Fallback secret used only when `--dev` is passed. Starting in
/// production without an explicit `DISCOVERY_SECRET` is refused.
pub const INSECURE_DEV_SECRET: &str = "defaultSecret";

#[derive(Debug, Parser, Clone)]
#[command(name = "room-server")]
pub struct RoomServerConfig {
    /// Externally-reachable address clients dial; also the fleet-unique bus routing key.
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: String,

    /// Local socket address to bind the WebSocket/HTTP listener on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: String,

    /// Shared secret used to verify join tokens.
    #[arg(long, env = "DISCOVERY_SECRET")]
    pub discovery_secret: Option<String>,

    /// NATS server URL for the message bus.
    #[arg(long, env = "BUS_URL", default_value = "127.0.0.1:4222")]
    pub bus_url: String,

    /// Allow the insecure default secret when `discovery_secret` is unset.
    #[arg(long)]
    pub dev: bool,

    /// Mirror room/client lifecycle onto the bus as `rs.event` messages.
    #[arg(long, env = "SYNC_ROOMS", default_value_t = true)]
    pub sync_rooms: bool,

    /// Include client rosters in mirrored events and `rooms.<url>` replies
    /// (ineffective if `sync_rooms` is false).
    #[arg(long, env = "SYNC_CLIENTS", default_value_t = true)]
    pub sync_clients: bool,

    /// Default per-room ping interval in milliseconds, applied to rooms
    /// created without an explicit override. Absent = no heartbeat.
    #[arg(long, env = "PING_INTERVAL_MS")]
    pub ping_interval_ms: Option<u64>,

    /// Default missed-pings eviction threshold.
    #[arg(long, env = "MISSED_PINGS_LIMIT", default_value_t = 1)]
    pub missed_pings_limit: u32,

    /// Default keep-alive behavior for newly created rooms.
    #[arg(long, env = "KEEP_ALIVE", default_value_t = false)]
    pub keep_alive: bool,
}

impl RoomServerConfig {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let cfg = Self::parse();
        cfg.resolve_secret()?;
        Ok(cfg)
    }

    pub fn secret(&self) -> Result<String> {
        self.resolve_secret()
    }

    fn resolve_secret(&self) -> Result<String> {
        match &self.discovery_secret {
            Some(secret) => Ok(secret.clone()),
            None if self.dev => Ok(INSECURE_DEV_SECRET.to_string()),
            None => Err(Error::Config(
                "DISCOVERY_SECRET must be set outside --dev mode".into(),
            )),
        }
    }

    pub fn default_ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Parser, Clone)]
#[command(name = "discovery")]
pub struct DiscoveryConfig {
    /// Local socket address to bind the token/introspection HTTP API on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:9000")]
    pub bind_addr: String,

    /// Shared secret used to sign join tokens.
    #[arg(long, env = "DISCOVERY_SECRET")]
    pub discovery_secret: Option<String>,

    /// NATS server URL for the message bus.
    #[arg(long, env = "BUS_URL", default_value = "127.0.0.1:4222")]
    pub bus_url: String,

    /// Allow the insecure default secret when `discovery_secret` is unset.
    #[arg(long)]
    pub dev: bool,

    /// How long a server record may go without a ping before eviction.
    #[arg(long, env = "SERVER_TIMEOUT_MS", default_value_t = 5000)]
    pub server_timeout_ms: u64,
}

impl DiscoveryConfig {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let cfg = Self::parse();
        cfg.resolve_secret()?;
        Ok(cfg)
    }

    pub fn secret(&self) -> Result<String> {
        self.resolve_secret()
    }

    fn resolve_secret(&self) -> Result<String> {
        match &self.discovery_secret {
            Some(secret) => Ok(secret.clone()),
            None if self.dev => Ok(INSECURE_DEV_SECRET.to_string()),
            None => Err(Error::Config(
                "DISCOVERY_SECRET must be set outside --dev mode".into(),
            )),
        }
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_server_config(dev: bool, discovery_secret: Option<&str>) -> RoomServerConfig {
        RoomServerConfig {
            public_url: "rs-a".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            discovery_secret: discovery_secret.map(str::to_string),
            bus_url: "127.0.0.1:4222".to_string(),
            dev,
            sync_rooms: true,
            sync_clients: true,
            ping_interval_ms: None,
            missed_pings_limit: 1,
            keep_alive: false,
        }
    }

    #[test]
    fn refuses_the_default_secret_outside_dev_mode() {
        let cfg = room_server_config(false, None);
        assert!(cfg.secret().is_err());
    }

    #[test]
    fn falls_back_to_the_insecure_default_only_in_dev_mode() {
        let cfg = room_server_config(true, None);
        assert_eq!(cfg.secret().unwrap(), INSECURE_DEV_SECRET);
    }

    #[test]
    fn an_explicit_secret_is_always_honored() {
        let cfg = room_server_config(false, Some("prod-secret"));
        assert_eq!(cfg.secret().unwrap(), "prod-secret");
    }
}
