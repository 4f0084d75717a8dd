//! Error types for the sentinel.
//!
//! Per-session errors ([`ConnectError`], [`HandshakeError`], [`SessionError`])
//! never reach the caller: a session that hits one is marked Failed and the
//! engine's reconnection policy takes over. Only [`LifecycleError`] is
//! returned synchronously from `start`.

use radar_wire::DecodeError;
use std::time::Duration;
use thiserror::Error;

/// Establishing a TCP connection (plus handshake) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("Connection refused by {0}")]
    Refused(String),

    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Aborted by shutdown")]
    Aborted,
}

/// The peer's handshake was rejected or never completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Protocol version {version} below minimum {min}")]
    VersionTooOld { version: i32, min: i32 },

    #[error("Peer services {advertised:#x} missing required {required:#x}")]
    MissingServices { advertised: u64, required: u64 },

    #[error("Connected to ourselves (nonce {0:#x})")]
    SelfConnection(u64),

    #[error("Malformed handshake response: {0}")]
    Malformed(String),

    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("Peer closed the connection during handshake")]
    ConnectionClosed,

    #[error("I/O error during handshake: {0}")]
    Io(String),
}

/// Queueing an outbound message failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Session is not ready")]
    NotReady,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Outbound queue full")]
    QueueFull,
}

/// Why a Ready session failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("No traffic for {0:?}")]
    Inactive(Duration),

    #[error("Too many protocol violations ({0})")]
    TooManyViolations(u32),

    #[error("Session task ended abnormally: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

/// Synchronous failures of `start`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Sentinel is already running")]
    AlreadyRunning,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Loading or validating [`crate::SentinelConfig`] failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}
