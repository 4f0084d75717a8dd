//! # Pool Supervisor
//!
//! One task per run. Owns the [`SlotTable`], launches sessions, decides the
//! start status and replaces lost peers within each slot's retry budget.
//!
//! ```text
//! discovery ──→ launch N sessions ──→ ┌─ Ready  ──→ report success (first only)
//!                                     ├─ Closed ──→ replace / exhaust slot
//!                                     ├─ window ──→ report NoReadyPeers
//!                                     └─ stop   ──→ drain sessions
//! ```

use radar_telemetry::{log_peer_event, metric_inc, SLOT_REPLACEMENTS};
use shared_types::{ConnectionId, PeerAddress};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time;
use tracing::{debug, error, info, warn};

use super::observer::{EngineObserver, SupervisorEvent};
use crate::dispatcher::{DispatchHandle, StartStatus};
use crate::domain::{SlotDecision, SlotIndex, SlotTable};
use crate::errors::SessionError;
use crate::ports::{CandidateSource, SessionObserver};
use crate::session::{run_session, wait_for_shutdown, CloseReason, SessionContext};

pub(crate) struct Supervisor {
    discovery: Arc<dyn CandidateSource>,
    ctx: SessionContext,
    observer: Arc<EngineObserver>,
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    dispatch: DispatchHandle,
    shutdown: watch::Receiver<bool>,
    slots: SlotTable,
    peers: HashMap<ConnectionId, PeerAddress>,
    ready: HashSet<ConnectionId>,
    sessions: JoinSet<()>,
    tasks: HashMap<task::Id, ConnectionId>,
    next_id: u32,
    status_reported: bool,
}

impl Supervisor {
    pub(crate) fn new(
        peer_count: usize,
        ctx: SessionContext,
        discovery: Arc<dyn CandidateSource>,
        observer: Arc<EngineObserver>,
        events: mpsc::UnboundedReceiver<SupervisorEvent>,
        dispatch: DispatchHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let max_retries = ctx.config.policy.max_retries_per_slot;
        Self {
            discovery,
            ctx,
            observer,
            events,
            dispatch,
            shutdown,
            slots: SlotTable::new(peer_count, max_retries),
            peers: HashMap::new(),
            ready: HashSet::new(),
            sessions: JoinSet::new(),
            tasks: HashMap::new(),
            next_id: 0,
            status_reported: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let requested = self.slots.stats().requested;
        let candidates = tokio::select! {
            candidates = self.discovery.next_candidates(requested) => candidates,
            _ = wait_for_shutdown(&mut self.shutdown) => return,
        };

        if candidates.is_empty() {
            warn!(requested, "Discovery returned no candidates");
            for index in 0..requested {
                self.slots.mark_exhausted(index);
            }
            self.report(StartStatus::NoCandidates);
            wait_for_shutdown(&mut self.shutdown).await;
            return;
        }

        let available = candidates.len().min(requested);
        if available < requested {
            warn!(
                requested,
                available, "Fewer candidates than requested; running with a reduced peer count"
            );
            for index in available..requested {
                self.slots.mark_exhausted(index);
            }
        }
        for (index, address) in candidates.into_iter().take(available).enumerate() {
            self.launch(index, address);
        }

        let window = self.ctx.config.timeouts.startup_window();
        let startup = time::sleep(window);
        tokio::pin!(startup);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => break,

                _ = &mut startup, if !self.status_reported => {
                    warn!(?window, "No peer became ready within the startup window");
                    self.report(StartStatus::NoReadyPeers);
                }

                Some(event) = self.events.recv() => self.handle_event(event).await,

                Some(joined) = self.sessions.join_next_with_id() => self.on_joined(joined),
            }
        }

        self.drain().await;
    }

    async fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Ready(id) => {
                self.ready.insert(id);
                if !self.status_reported {
                    info!(connection_id = id.get(), "First peer ready");
                    self.report(StartStatus::Ready);
                }
            }
            SupervisorEvent::Closed(id, reason) => self.on_closed(id, reason).await,
        }
    }

    /// A session task that dies without reporting `on_closed` still holds its
    /// slot; report the close on its behalf so the slot is released.
    fn on_joined(&mut self, joined: Result<(task::Id, ()), JoinError>) {
        let e = match joined {
            Ok((task_id, ())) => {
                self.tasks.remove(&task_id);
                return;
            }
            Err(e) => e,
        };
        error!(error = %e, "Session task ended abnormally");

        let Some(id) = self.tasks.remove(&e.id()) else {
            return;
        };
        if self.slots.slot_of(id).is_some() {
            self.observer
                .on_closed(id, CloseReason::Failed(SessionError::Aborted(e.to_string())));
        }
    }

    async fn on_closed(&mut self, id: ConnectionId, reason: CloseReason) {
        let was_ready = self.ready.remove(&id);
        let address = self.peers.remove(&id);
        let Some(index) = self.slots.release(id) else {
            return;
        };

        let stopping = *self.shutdown.borrow();
        if stopping || reason == CloseReason::Stopped {
            return;
        }

        if let Some(address) = &address {
            log_peer_event!(
                warn,
                "Peer lost",
                id,
                address,
                slot = index,
                reason = reason.label(),
                was_ready
            );
        }
        if let CloseReason::Failed(e) = &reason {
            debug!(connection_id = id.get(), error = %e, "Session failure detail");
        }

        match self.slots.on_session_lost(index) {
            SlotDecision::Replace(index) => self.replace(index).await,
            SlotDecision::Exhausted(index) => warn!(
                slot = index,
                effective_peers = self.slots.effective_count(),
                "Slot retry budget spent; peer count reduced"
            ),
        }

        if self.slots.all_exhausted() && !self.status_reported {
            warn!("Every peer slot failed");
            self.report(StartStatus::AllPeersFailed);
        } else if was_ready && self.ready.is_empty() {
            let stats = self.slots.stats();
            warn!(
                live = stats.occupied,
                exhausted = stats.exhausted,
                "All ready peers lost; running degraded"
            );
        }
    }

    async fn replace(&mut self, index: SlotIndex) {
        let candidates = tokio::select! {
            candidates = self.discovery.next_candidates(1) => candidates,
            _ = wait_for_shutdown(&mut self.shutdown) => return,
        };

        match candidates.into_iter().next() {
            Some(address) => {
                metric_inc!(SLOT_REPLACEMENTS);
                info!(slot = index, peer = %address, "Replacing lost peer");
                self.launch(index, address);
            }
            None => {
                self.slots.mark_exhausted(index);
                warn!(
                    slot = index,
                    effective_peers = self.slots.effective_count(),
                    "No spare candidates; peer count reduced"
                );
            }
        }
    }

    fn launch(&mut self, index: SlotIndex, address: PeerAddress) {
        self.next_id = self.next_id.wrapping_add(1);
        let id = ConnectionId(self.next_id);
        self.slots.assign(index, id);
        self.peers.insert(id, address.clone());
        log_peer_event!(debug, "Launching session", id, address, slot = index);

        let observer: Arc<dyn SessionObserver> = self.observer.clone();
        let task = self.sessions.spawn(run_session(
            id,
            address,
            self.ctx.clone(),
            observer,
            self.shutdown.clone(),
        ));
        self.tasks.insert(task.id(), id);
    }

    fn report(&mut self, status: StartStatus) {
        self.status_reported = true;
        self.dispatch.started(status);
    }

    async fn drain(&mut self) {
        debug!(sessions = self.sessions.len(), "Waiting for sessions to close");
        while let Some(joined) = self.sessions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Session task ended abnormally");
            }
        }
        debug!("All sessions closed");
    }
}
