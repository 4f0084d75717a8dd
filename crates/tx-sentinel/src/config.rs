//! # Sentinel Configuration
//!
//! Loaded from TOML with environment overrides applied on top.
//!
//! ```toml
//! network = "mainnet"
//!
//! [handshake]
//! protocol_version = 70016
//! min_peer_version = 70001
//! required_services = 1
//! user_agent = "/tx-radar:0.1.0/"
//!
//! [timeouts]
//! connect_secs = 5
//! handshake_secs = 10
//! startup_window_secs = 30
//! stop_grace_ms = 5000
//!
//! [policy]
//! max_retries_per_slot = 3
//! notify = "first_sighting"
//! filter = "all"
//!
//! [seeds]
//! dns = ["seed.bitcoin.sipa.be"]
//! ```

use radar_discovery::SeedConfig;
use radar_wire::{Network, ServiceFlags};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::domain::{NotifyPolicy, SightingFilter};
use crate::errors::ConfigError;

/// Top-level sentinel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub network: Network,
    pub handshake: HandshakeConfig,
    pub timeouts: TimeoutConfig,
    pub policy: PolicyConfig,
    pub seeds: SeedConfig,
}

/// What we advertise in `version` and what we require from peers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub protocol_version: i32,
    /// Peers advertising a lower version are rejected.
    pub min_peer_version: i32,
    /// Service bits every peer must advertise.
    pub required_services: ServiceFlags,
    /// Service bits we advertise.
    pub local_services: ServiceFlags,
    pub user_agent: String,
    pub start_height: i32,
    /// Ask peers to announce transactions (BIP37 relay flag).
    pub relay: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: 70016,
            min_peer_version: 70001,
            required_services: ServiceFlags::NETWORK,
            local_services: ServiceFlags::NONE,
            user_agent: format!("/tx-radar:{}/", env!("CARGO_PKG_VERSION")),
            start_height: 0,
            relay: true,
        }
    }
}

/// Bounds on every blocking network operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub handshake_secs: u64,
    /// A Ready session with no inbound traffic for this long is failed.
    pub inactivity_secs: u64,
    pub ping_interval_secs: u64,
    /// `on_started` reports failure if nothing is Ready by then.
    pub startup_window_secs: u64,
    /// Upper bound on `stop()`.
    pub stop_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            handshake_secs: 10,
            inactivity_secs: 600,
            ping_interval_secs: 120,
            startup_window_secs: 30,
            stop_grace_ms: 5000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn inactivity(&self) -> Duration {
        Duration::from_secs(self.inactivity_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn startup_window(&self) -> Duration {
        Duration::from_secs(self.startup_window_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Pool, tracker and notification policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Replacements allowed per slot before it is given up.
    pub max_retries_per_slot: u32,
    /// Protocol violations tolerated before a session is failed.
    pub max_violations: u32,
    pub notify: NotifyPolicy,
    pub filter: SightingFilter,
    /// Cap on hashes held by the tracker.
    pub max_tracked_hashes: usize,
    /// Per-session outbound queue depth.
    pub outbound_queue: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries_per_slot: 3,
            max_violations: 10,
            notify: NotifyPolicy::FirstSighting,
            filter: SightingFilter::All,
            max_tracked_hashes: 100_000,
            outbound_queue: 64,
        }
    }
}

impl SentinelConfig {
    /// Short timeouts against regtest, for tests with local mock peers.
    pub fn for_testing() -> Self {
        Self {
            network: Network::Regtest,
            timeouts: TimeoutConfig {
                connect_secs: 2,
                handshake_secs: 2,
                inactivity_secs: 30,
                ping_interval_secs: 30,
                startup_window_secs: 3,
                stop_grace_ms: 2000,
            },
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RADAR_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    ///
    /// | Key | Field |
    /// |-----|-------|
    /// | `RADAR_NETWORK` | `network` |
    /// | `RADAR_CONNECT_TIMEOUT_SECS` | `timeouts.connect_secs` |
    /// | `RADAR_HANDSHAKE_TIMEOUT_SECS` | `timeouts.handshake_secs` |
    /// | `RADAR_STARTUP_WINDOW_SECS` | `timeouts.startup_window_secs` |
    /// | `RADAR_STOP_GRACE_MS` | `timeouts.stop_grace_ms` |
    /// | `RADAR_MAX_RETRIES` | `policy.max_retries_per_slot` |
    /// | `RADAR_NOTIFY` | `policy.notify` |
    /// | `RADAR_FILTER` | `policy.filter` |
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RADAR_NETWORK") {
            self.network = parse_value("RADAR_NETWORK", &v)?;
        }
        if let Some(v) = lookup("RADAR_CONNECT_TIMEOUT_SECS") {
            self.timeouts.connect_secs = parse_value("RADAR_CONNECT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("RADAR_HANDSHAKE_TIMEOUT_SECS") {
            self.timeouts.handshake_secs = parse_value("RADAR_HANDSHAKE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("RADAR_STARTUP_WINDOW_SECS") {
            self.timeouts.startup_window_secs = parse_value("RADAR_STARTUP_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("RADAR_STOP_GRACE_MS") {
            self.timeouts.stop_grace_ms = parse_value("RADAR_STOP_GRACE_MS", &v)?;
        }
        if let Some(v) = lookup("RADAR_MAX_RETRIES") {
            self.policy.max_retries_per_slot = parse_value("RADAR_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RADAR_NOTIFY") {
            self.policy.notify = parse_value("RADAR_NOTIFY", &v)?;
        }
        if let Some(v) = lookup("RADAR_FILTER") {
            self.policy.filter = parse_value("RADAR_FILTER", &v)?;
        }
        self.validate()
    }

    /// Reject values that would make the engine hang or spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("timeouts.connect_secs", self.timeouts.connect_secs),
            ("timeouts.handshake_secs", self.timeouts.handshake_secs),
            ("timeouts.inactivity_secs", self.timeouts.inactivity_secs),
            ("timeouts.ping_interval_secs", self.timeouts.ping_interval_secs),
            ("timeouts.startup_window_secs", self.timeouts.startup_window_secs),
            ("policy.outbound_queue", self.policy.outbound_queue as u64),
            ("policy.max_tracked_hashes", self.policy.max_tracked_hashes as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.handshake.min_peer_version > self.handshake.protocol_version {
            return Err(ConfigError::Invalid {
                key: "handshake.min_peer_version".to_string(),
                reason: format!(
                    "{} exceeds protocol_version {}",
                    self.handshake.min_peer_version, self.handshake.protocol_version
                ),
            });
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
