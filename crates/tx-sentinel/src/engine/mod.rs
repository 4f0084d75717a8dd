//! # Sentinel Engine
//!
//! Synchronous facade over an owned tokio runtime. Each `start` creates one
//! [`ActiveRun`]: a worker pool, a dispatcher thread, a fresh tracker and a
//! supervisor task. `stop` tears all of it down within the configured grace
//! period.
//!
//! ## Threads
//!
//! | Thread | Count | Runs |
//! |--------|-------|------|
//! | `radar-worker` | `worker_threads` | supervisor and every session loop |
//! | `radar-dispatch` | 1 | caller callbacks, one at a time |
//! | caller | any | `start`, `broadcast`, `stop`, queries |

mod observer;
mod supervisor;

use parking_lot::Mutex;
use radar_telemetry::{log_tx_event, metric_inc, BROADCASTS, PEERS_READY, TRACKED_HASHES};
use radar_wire::{BitcoinCodec, Message};
use shared_types::{InvalidHashLength, TxHash};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::{self, Runtime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::observer::{EngineObserver, SessionRegistry};
use self::supervisor::Supervisor;
use crate::config::SentinelConfig;
use crate::dispatcher::{EventDispatcher, SightingCallback, StartedCallback};
use crate::domain::{InventoryTracker, PayloadStore, SightingRecord};
use crate::errors::LifecycleError;
use crate::ports::{CandidateSource, MessageCodec, PropagationRadar};
use crate::session::SessionContext;

/// Poll interval while waiting for the supervisor to finish.
const STOP_POLL: Duration = Duration::from_millis(5);

/// Minimum time given to the dispatcher to deliver `on_started(Stopped)`.
const DISPATCH_FLUSH: Duration = Duration::from_millis(50);

/// The propagation radar.
///
/// ## Usage
///
/// ```rust,ignore
/// let engine = SentinelEngine::new(config, Arc::new(StaticCandidates::new(seeds)));
/// engine.start(8, 2, Box::new(|h| println!("seen {h}")), Box::new(|s| println!("{s}")))?;
/// let sent = engine.broadcast(&raw_tx);
/// engine.stop();
/// ```
pub struct SentinelEngine {
    config: Arc<SentinelConfig>,
    discovery: Arc<dyn CandidateSource>,
    codec: Arc<dyn MessageCodec>,
    active: Mutex<Option<ActiveRun>>,
}

impl SentinelEngine {
    /// Create a stopped engine speaking the configured network's wire format.
    pub fn new(config: SentinelConfig, discovery: Arc<dyn CandidateSource>) -> Self {
        let codec = Arc::new(BitcoinCodec::new(config.network));
        Self {
            config: Arc::new(config),
            discovery,
            codec,
            active: Mutex::new(None),
        }
    }

    /// Replace the wire codec.
    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    fn broadcast_hash(&self, payload: &[u8], hash: TxHash) -> usize {
        if payload.is_empty() {
            warn!("Refusing to broadcast an empty payload");
            return 0;
        }
        match self.active.lock().as_ref() {
            Some(run) => run.broadcast(payload, hash),
            None => {
                debug!(tx_hash = %hash, "Broadcast while stopped");
                0
            }
        }
    }
}

impl PropagationRadar for SentinelEngine {
    fn start(
        &self,
        peer_count: usize,
        worker_threads: usize,
        on_sighting: SightingCallback,
        on_started: StartedCallback,
    ) -> Result<(), LifecycleError> {
        if peer_count == 0 {
            return Err(LifecycleError::InvalidArgument(
                "peer_count must be at least 1".to_string(),
            ));
        }
        if worker_threads == 0 {
            return Err(LifecycleError::InvalidArgument(
                "worker_threads must be at least 1".to_string(),
            ));
        }

        self.config
            .validate()
            .map_err(|e| LifecycleError::InvalidArgument(e.to_string()))?;

        let mut active = self.active.lock();
        if active.is_some() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let run = ActiveRun::launch(
            &self.config,
            &self.discovery,
            &self.codec,
            peer_count,
            worker_threads,
            on_sighting,
            on_started,
        )?;
        *active = Some(run);

        info!(
            peer_count,
            worker_threads,
            network = %self.config.network,
            "Sentinel started"
        );
        Ok(())
    }

    fn broadcast(&self, payload: &[u8]) -> usize {
        self.broadcast_hash(payload, TxHash::of_payload(payload))
    }

    fn broadcast_with_hash(&self, payload: &[u8], hash: &[u8]) -> Result<usize, InvalidHashLength> {
        let hash = TxHash::from_slice(hash)?;
        Ok(self.broadcast_hash(payload, hash))
    }

    fn stop(&self) {
        // Never hold the lock during teardown: callbacks may call back in.
        let run = self.active.lock().take();
        match run {
            Some(run) => run.shutdown(self.config.timeouts.stop_grace()),
            None => debug!("Stop while not running"),
        }
    }

    fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    fn ready_peer_count(&self) -> usize {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |run| run.registry.read().values().filter(|h| h.is_ready()).count())
    }

    fn propagation_count(&self, hash: &TxHash) -> usize {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |run| run.tracker.count(hash))
    }

    fn sighting(&self, hash: &TxHash) -> Option<SightingRecord> {
        self.active
            .lock()
            .as_ref()
            .and_then(|run| run.tracker.sighting(hash))
    }
}

impl Drop for SentinelEngine {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().take() {
            warn!("Sentinel dropped while running; stopping");
            run.shutdown(self.config.timeouts.stop_grace());
        }
    }
}

/// Everything owned by one Start/Stop cycle.
struct ActiveRun {
    runtime: Runtime,
    shutdown: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
    dispatcher: EventDispatcher,
    tracker: Arc<InventoryTracker>,
    payloads: Arc<PayloadStore>,
    registry: SessionRegistry,
    codec: Arc<dyn MessageCodec>,
}

impl ActiveRun {
    fn launch(
        config: &Arc<SentinelConfig>,
        discovery: &Arc<dyn CandidateSource>,
        codec: &Arc<dyn MessageCodec>,
        peer_count: usize,
        worker_threads: usize,
        on_sighting: SightingCallback,
        on_started: StartedCallback,
    ) -> Result<Self, LifecycleError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("radar-worker")
            .enable_all()
            .build()
            .map_err(|e| LifecycleError::WorkerPool(e.to_string()))?;

        let dispatcher = match EventDispatcher::spawn(on_sighting, on_started) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                runtime.shutdown_background();
                return Err(LifecycleError::WorkerPool(e.to_string()));
            }
        };

        let tracker = Arc::new(InventoryTracker::new(config.policy.max_tracked_hashes));
        let payloads = Arc::new(PayloadStore::new());
        let registry = SessionRegistry::default();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let observer = Arc::new(EngineObserver::new(
            tracker.clone(),
            registry.clone(),
            dispatcher.handle(),
            config.policy.notify,
            config.policy.filter,
            events_tx,
        ));
        let ctx = SessionContext::new(config.clone(), codec.clone(), payloads.clone());
        let supervisor = Supervisor::new(
            peer_count,
            ctx,
            discovery.clone(),
            observer,
            events_rx,
            dispatcher.handle(),
            shutdown_rx,
        );
        let supervisor = runtime.spawn(supervisor.run());

        Ok(Self {
            runtime,
            shutdown,
            supervisor,
            dispatcher,
            tracker,
            payloads,
            registry,
            codec: codec.clone(),
        })
    }

    /// Queue `payload` to every Ready session.
    fn broadcast(&self, payload: &[u8], hash: TxHash) -> usize {
        self.tracker.expect(hash);
        self.payloads.insert(hash, payload);

        let frame: Arc<[u8]> = self.codec.encode(&Message::Tx(payload.to_vec())).into();
        let handles: Vec<_> = self.registry.read().values().cloned().collect();

        let mut sent = 0;
        for handle in &handles {
            match handle.send_frame(frame.clone()) {
                Ok(()) => sent += 1,
                Err(e) => debug!(connection_id = handle.id().get(), error = %e, "Broadcast skipped peer"),
            }
        }

        metric_inc!(BROADCASTS);
        log_tx_event!(info, "Broadcast queued", hash, peers = sent);
        sent
    }

    /// Signal every task, wait up to `grace`, then release the pool.
    ///
    /// Sessions still open when the grace period runs out are abandoned.
    fn shutdown(self, grace: Duration) {
        let started = Instant::now();
        let ActiveRun {
            runtime,
            shutdown,
            supervisor,
            dispatcher,
            tracker,
            payloads,
            registry,
            ..
        } = self;

        shutdown.send_replace(true);

        while !supervisor.is_finished() {
            if started.elapsed() >= grace {
                warn!(
                    ?grace,
                    open_sessions = registry.read().len(),
                    "Sessions did not close within the grace period; abandoning them"
                );
                break;
            }
            thread::sleep(STOP_POLL);
        }

        // Blocking shutdown panics inside an async context.
        if runtime::Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(grace.saturating_sub(started.elapsed()));
        }

        registry.write().clear();
        PEERS_READY.set(0.0);

        dispatcher.shutdown(grace.saturating_sub(started.elapsed()).max(DISPATCH_FLUSH));

        let tracked = tracker.len();
        let broadcasts = payloads.len();
        tracker.reset();
        payloads.clear();
        TRACKED_HASHES.set(0.0);

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            tracked,
            broadcasts,
            "Sentinel stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::StartStatus;
    use radar_discovery::StaticCandidates;
    use std::sync::mpsc as std_mpsc;

    fn engine() -> SentinelEngine {
        SentinelEngine::new(
            SentinelConfig::for_testing(),
            Arc::new(StaticCandidates::new(Vec::new())),
        )
    }

    fn noop_sighting() -> SightingCallback {
        Box::new(|_| {})
    }

    #[test]
    fn test_zero_counts_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.start(0, 1, noop_sighting(), Box::new(|_| {})),
            Err(LifecycleError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.start(1, 0, noop_sighting(), Box::new(|_| {})),
            Err(LifecycleError::InvalidArgument(_))
        ));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_invalid_config_rejected_at_start() {
        let mut config = SentinelConfig::for_testing();
        config.policy.outbound_queue = 0;
        let engine = SentinelEngine::new(config, Arc::new(StaticCandidates::new(Vec::new())));
        let err = engine.start(1, 1, noop_sighting(), Box::new(|_| {})).unwrap_err();
        assert!(matches!(&err, LifecycleError::InvalidArgument(msg) if msg.contains("outbound_queue")));
        assert!(!engine.is_running());

        let mut config = SentinelConfig::for_testing();
        config.timeouts.ping_interval_secs = 0;
        let engine = SentinelEngine::new(config, Arc::new(StaticCandidates::new(Vec::new())));
        assert!(matches!(
            engine.start(1, 1, noop_sighting(), Box::new(|_| {})),
            Err(LifecycleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_stopped_engine_queries() {
        let engine = engine();
        let hash = TxHash::new([1; 32]);
        assert_eq!(engine.broadcast(&[1, 2, 3]), 0);
        assert_eq!(engine.ready_peer_count(), 0);
        assert_eq!(engine.propagation_count(&hash), 0);
        assert!(engine.sighting(&hash).is_none());
        engine.stop();
        engine.stop();
    }

    #[test]
    fn test_wrong_hash_length_rejected() {
        let engine = engine();
        assert_eq!(
            engine.broadcast_with_hash(&[1], &[0; 31]),
            Err(InvalidHashLength {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_no_candidates_reported_and_second_start_rejected() {
        let engine = engine();
        let (tx, rx) = std_mpsc::channel();
        engine
            .start(3, 1, noop_sighting(), Box::new(move |s: StartStatus| tx.send(s).unwrap()))
            .unwrap();

        assert_eq!(
            engine.start(3, 1, noop_sighting(), Box::new(|_| {})),
            Err(LifecycleError::AlreadyRunning)
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            StartStatus::NoCandidates
        );

        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_stop_from_inside_callback() {
        let engine = Arc::new(engine());
        let inner = engine.clone();
        let (tx, rx) = std_mpsc::channel();
        engine
            .start(
                1,
                1,
                noop_sighting(),
                Box::new(move |_: StartStatus| {
                    inner.stop();
                    tx.send(inner.is_running()).unwrap();
                }),
            )
            .unwrap();

        assert!(!rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!engine.is_running());
    }

    #[test]
    fn test_restart_after_stop() {
        let engine = engine();
        engine.start(1, 1, noop_sighting(), Box::new(|_| {})).unwrap();
        engine.stop();
        engine.start(1, 1, noop_sighting(), Box::new(|_| {})).unwrap();
        assert!(engine.is_running());
        engine.stop();
    }

    #[test]
    fn test_drop_while_running_stops() {
        let (tx, rx) = std_mpsc::channel();
        {
            let engine = engine();
            engine
                .start(1, 1, noop_sighting(), Box::new(move |s: StartStatus| tx.send(s).unwrap()))
                .unwrap();
        }
        // The run was torn down, so the start status has been delivered.
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_inside_async_context() {
        let engine = engine();
        engine.start(1, 1, noop_sighting(), Box::new(|_| {})).unwrap();
        let started = Instant::now();
        engine.stop();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!engine.is_running());
    }
}
