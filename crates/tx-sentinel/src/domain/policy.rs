//! Notification policy.
//!
//! Decides, from a [`SightingOutcome`], whether the caller hears about it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::tracker::SightingOutcome;

/// When `on_sighting` fires for a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Once per hash, on the first peer to announce it.
    #[default]
    FirstSighting,
    /// Once per distinct (peer, hash) pair. N callbacks for a hash means N
    /// peers relayed it.
    EveryNewPeer,
}

/// Which hashes are eligible for notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SightingFilter {
    /// Every transaction announced on the network.
    #[default]
    All,
    /// Only hashes we broadcast ourselves.
    ExpectedOnly,
}

impl FromStr for NotifyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_sighting" => Ok(Self::FirstSighting),
            "every_new_peer" => Ok(Self::EveryNewPeer),
            other => Err(format!("expected first_sighting or every_new_peer, got '{other}'")),
        }
    }
}

impl FromStr for SightingFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "expected_only" => Ok(Self::ExpectedOnly),
            other => Err(format!("expected all or expected_only, got '{other}'")),
        }
    }
}

/// Whether `outcome` should produce a caller notification.
pub fn should_notify(policy: NotifyPolicy, filter: SightingFilter, outcome: &SightingOutcome) -> bool {
    if filter == SightingFilter::ExpectedOnly && !outcome.is_expected {
        return false;
    }
    match policy {
        NotifyPolicy::FirstSighting => outcome.is_first_sighting_of_hash,
        NotifyPolicy::EveryNewPeer => outcome.is_new_peer_for_hash,
    }
}
