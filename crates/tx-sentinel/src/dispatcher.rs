//! # Event Dispatcher
//!
//! The only place caller callbacks run. Network tasks publish
//! [`DispatchEvent`]s on a channel; one dedicated thread drains it and
//! invokes callbacks in order, so the caller never sees two callbacks at
//! once and never runs on a worker thread.

use radar_telemetry::{HistogramTimer, CALLBACK_LATENCY};
use shared_types::TxHash;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Outcome reported through `on_started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    /// At least one session reached Ready within the startup window.
    Ready,
    /// The startup window elapsed with zero Ready sessions.
    NoReadyPeers,
    /// Every slot failed and exhausted its retry budget.
    AllPeersFailed,
    /// Discovery returned no candidates at all.
    NoCandidates,
    /// `stop()` ran before readiness was decided.
    Stopped,
}

impl StartStatus {
    /// Numeric status code; zero means success.
    pub fn code(self) -> i32 {
        match self {
            StartStatus::Ready => 0,
            StartStatus::NoReadyPeers => 1,
            StartStatus::AllPeersFailed => 2,
            StartStatus::NoCandidates => 3,
            StartStatus::Stopped => 4,
        }
    }

    pub fn is_success(self) -> bool {
        self == StartStatus::Ready
    }
}

impl fmt::Display for StartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StartStatus::Ready => "ready",
            StartStatus::NoReadyPeers => "no peer became ready within the startup window",
            StartStatus::AllPeersFailed => "all peers failed",
            StartStatus::NoCandidates => "discovery returned no candidates",
            StartStatus::Stopped => "stopped before startup completed",
        };
        f.write_str(s)
    }
}

/// Invoked for each notified sighting.
pub type SightingCallback = Box<dyn FnMut(TxHash) + Send + 'static>;

/// Invoked exactly once per start.
pub type StartedCallback = Box<dyn FnOnce(StartStatus) + Send + 'static>;

/// Internal messages for the dispatcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    Started(StartStatus),
    Sighting(TxHash),
    Shutdown,
}

type Envelope = (DispatchEvent, Instant);

/// Cloneable sender side used by network tasks.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl DispatchHandle {
    pub fn started(&self, status: StartStatus) {
        self.publish(DispatchEvent::Started(status));
    }

    pub fn sighting(&self, hash: TxHash) {
        self.publish(DispatchEvent::Sighting(hash));
    }

    fn publish(&self, event: DispatchEvent) {
        if self.tx.send((event, Instant::now())).is_err() {
            debug!(?event, "Dispatcher gone; event dropped");
        }
    }
}

/// Owns the dispatcher thread.
pub struct EventDispatcher {
    handle: DispatchHandle,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl EventDispatcher {
    /// Spawn the dispatcher thread.
    pub fn spawn(
        on_sighting: SightingCallback,
        on_started: StartedCallback,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("radar-dispatch".to_string())
            .spawn(move || run(rx, on_sighting, on_started))?;

        Ok(Self {
            handle: DispatchHandle { tx },
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// True when called from inside a callback.
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Deliver what is already queued, then stop the thread.
    ///
    /// Waits at most `deadline` for the thread to finish. When called from a
    /// callback the thread cannot be joined and is left to exit on its own
    /// once the callback returns.
    pub fn shutdown(mut self, deadline: Duration) {
        self.handle.publish(DispatchEvent::Shutdown);

        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.is_dispatch_thread() {
            debug!("Stop called from a callback; dispatcher exits after it returns");
            return;
        }

        let until = Instant::now() + deadline;
        while !thread.is_finished() {
            if Instant::now() >= until {
                warn!(?deadline, "Dispatcher still busy in a callback; abandoning it");
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if thread.join().is_err() {
            error!("Dispatcher thread panicked");
        }
    }
}

fn run(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    mut on_sighting: SightingCallback,
    on_started: StartedCallback,
) {
    let mut on_started = Some(on_started);

    while let Some((event, published)) = rx.blocking_recv() {
        let _timer = HistogramTimer::since(&CALLBACK_LATENCY, published);
        match event {
            DispatchEvent::Started(status) => match on_started.take() {
                Some(callback) => invoke("on_started", move || callback(status)),
                None => debug!(%status, "Start status already delivered"),
            },
            DispatchEvent::Sighting(hash) => invoke("on_sighting", || on_sighting(hash)),
            DispatchEvent::Shutdown => break,
        }
    }

    // on_started fires exactly once per start, even when stopped early.
    if let Some(callback) = on_started.take() {
        invoke("on_started", move || callback(StartStatus::Stopped));
    }
}

/// Run a caller callback, containing any panic.
fn invoke<F: FnOnce()>(name: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = name, "Callback panicked");
    }
}
