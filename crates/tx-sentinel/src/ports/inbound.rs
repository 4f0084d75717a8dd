//! Inbound port: the API the sentinel offers its caller.

use shared_types::{InvalidHashLength, TxHash};

use crate::dispatcher::{SightingCallback, StartedCallback};
use crate::domain::SightingRecord;
use crate::errors::LifecycleError;

/// Transaction propagation radar.
///
/// All methods are synchronous and callable from any thread, including from
/// inside a callback.
pub trait PropagationRadar: Send + Sync {
    /// Begin a monitoring session.
    ///
    /// Connects to `peer_count` candidates using a pool of
    /// `worker_threads` threads. `on_started` fires exactly once with the
    /// readiness outcome; `on_sighting` fires per the configured
    /// notification policy.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyRunning`] if a session is active
    /// - [`LifecycleError::InvalidArgument`] if either count is zero
    fn start(
        &self,
        peer_count: usize,
        worker_threads: usize,
        on_sighting: SightingCallback,
        on_started: StartedCallback,
    ) -> Result<(), LifecycleError>;

    /// Send a serialized transaction to every Ready session.
    ///
    /// The hash is computed as double SHA-256 of the payload. Returns the
    /// number of sessions it was queued to; zero when not running.
    fn broadcast(&self, payload: &[u8]) -> usize;

    /// Like [`PropagationRadar::broadcast`] with a caller-supplied hash in
    /// wire byte order.
    fn broadcast_with_hash(&self, payload: &[u8], hash: &[u8]) -> Result<usize, InvalidHashLength>;

    /// Close every session and release the worker pool. No-op when stopped.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Sessions currently Ready.
    fn ready_peer_count(&self) -> usize;

    /// Distinct peers that announced `hash` during the current session.
    fn propagation_count(&self, hash: &TxHash) -> usize;

    /// Snapshot of everything known about `hash`.
    fn sighting(&self, hash: &TxHash) -> Option<SightingRecord>;
}
