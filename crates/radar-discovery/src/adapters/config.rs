use serde::Deserialize;
use shared_types::PeerAddress;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::dns_seed::DnsSeedCandidates;
use super::static_list::{ChainedCandidates, StaticCandidates};
use crate::ports::CandidateSource;

/// The `[seeds]` table of the radar configuration.
///
/// # Config File Format
///
/// ```toml
/// [seeds]
/// nodes = ["192.168.1.100:8333", "[2001:db8::1]:8333"]
/// dns = ["seed.bitcoin.sipa.be", "dnsseed.bluematt.me"]
/// dns_port = 8333
/// ```
///
/// Explicit `nodes` are tried before anything resolved from `dns`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub nodes: Vec<PeerAddress>,
    pub dns: Vec<String>,
    /// Port paired with DNS seed answers; the network default when unset.
    pub dns_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    seeds: SeedConfig,
}

impl SeedConfig {
    /// Load the `[seeds]` table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse the `[seeds]` table from a TOML document. Other tables are ignored.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: SeedFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(file.seeds)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.dns.is_empty()
    }

    /// Build the candidate source these seeds describe.
    ///
    /// `default_port` is used for DNS answers when `dns_port` is unset.
    pub fn into_source(self, default_port: u16) -> Box<dyn CandidateSource> {
        let port = self.dns_port.unwrap_or(default_port);
        match (self.nodes.is_empty(), self.dns.is_empty()) {
            (_, true) => Box::new(StaticCandidates::new(self.nodes)),
            (true, false) => Box::new(DnsSeedCandidates::new(self.dns, port)),
            (false, false) => Box::new(ChainedCandidates::new(vec![
                Box::new(StaticCandidates::new(self.nodes)),
                Box::new(DnsSeedCandidates::new(self.dns, port)),
            ])),
        }
    }
}

/// Errors that can occur while loading seeds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_table() {
        let config = SeedConfig::parse(
            r#"
            network = "regtest"

            [seeds]
            nodes = ["127.0.0.1:18444", "[::1]:18445"]
            dns = ["seed.example.org"]
            "#,
        )
        .unwrap();

        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1], PeerAddress::new("::1", 18445));
        assert_eq!(config.dns, vec!["seed.example.org".to_string()]);
        assert_eq!(config.dns_port, None);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let config = SeedConfig::parse("network = \"mainnet\"").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_bad_node_address_is_parse_error() {
        let result = SeedConfig::parse("[seeds]\nnodes = [\"no-port\"]");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = SeedConfig::load("/nonexistent/radar.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[tokio::test]
    async fn test_static_only_source() {
        let config = SeedConfig {
            nodes: vec![PeerAddress::new("10.0.0.1", 8333)],
            ..Default::default()
        };
        let source = config.into_source(8333);
        assert_eq!(source.next_candidates(3).await.len(), 1);
    }
}
