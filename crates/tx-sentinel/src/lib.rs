//! # Transaction Sentinel
//!
//! Holds connections to N Bitcoin peers, broadcasts transactions to them and
//! counts how many distinct peers announce each transaction back.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──start/broadcast/stop──→ [SentinelEngine] ──→ supervisor task
//!                                         │                   │
//!                                         │          spawn/replace sessions
//!                                         │                   ↓
//!                                         │            [PeerSession] × N ←──TCP──→ peers
//!                                         │                   │ inv
//!                                         ↓                   ↓
//!  caller ←──on_started/on_sighting── [EventDispatcher] ←── [InventoryTracker]
//! ```
//!
//! ## Guarantees
//!
//! - `on_started` fires exactly once per `start`.
//! - Callbacks never overlap and never run on a network worker thread.
//! - `stop` returns within `timeouts.stop_grace_ms`, abandoning sessions
//!   that fail to close in time.
//! - A (peer, hash) pair is counted at most once.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod ports;
pub mod session;

pub use config::{HandshakeConfig, PolicyConfig, SentinelConfig, TimeoutConfig};
pub use dispatcher::{SightingCallback, StartStatus, StartedCallback};
pub use domain::{NotifyPolicy, SightingFilter, SightingRecord};
pub use engine::SentinelEngine;
pub use errors::{ConfigError, ConnectError, HandshakeError, LifecycleError, SendError, SessionError};
pub use ports::PropagationRadar;
