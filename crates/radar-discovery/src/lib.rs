//! # Radar Discovery
//!
//! Supplies the propagation radar with `host:port` candidates to connect to.
//!
//! The engine only sees the [`CandidateSource`] port. Adapters provided here:
//!
//! - [`StaticCandidates`] - fixed list, each entry handed out once
//! - [`DnsSeedCandidates`] - resolves DNS seed names on first use
//! - [`ChainedCandidates`] - drains several sources in order
//!
//! [`SeedConfig`] is the `[seeds]` table of the radar config file and builds
//! the appropriate source.

pub mod adapters;
pub mod ports;

pub use adapters::config::{ConfigError, SeedConfig};
pub use adapters::dns_seed::DnsSeedCandidates;
pub use adapters::static_list::{ChainedCandidates, StaticCandidates};
pub use ports::CandidateSource;
