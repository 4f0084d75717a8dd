//! Session events fan out from here: inventory goes to the tracker and the
//! dispatcher, lifecycle goes to the session registry and the supervisor.

use parking_lot::RwLock;
use radar_telemetry::{log_peer_event, log_tx_event, metric_inc};
use radar_telemetry::{PEERS_READY, SESSION_OUTCOMES, SIGHTINGS, TRACKED_HASHES};
use radar_wire::{Inventory, Message};
use shared_types::{ConnectionId, PeerAddress, TxHash};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::DispatchHandle;
use crate::domain::{should_notify, InventoryTracker, NotifyPolicy, SightingFilter};
use crate::ports::SessionObserver;
use crate::session::{CloseReason, SessionHandle};

/// Ready sessions by connection id.
pub(crate) type SessionRegistry = Arc<RwLock<HashMap<ConnectionId, SessionHandle>>>;

/// Lifecycle notifications for the supervisor.
#[derive(Debug)]
pub(crate) enum SupervisorEvent {
    Ready(ConnectionId),
    Closed(ConnectionId, CloseReason),
}

pub(crate) struct EngineObserver {
    tracker: Arc<InventoryTracker>,
    registry: SessionRegistry,
    dispatch: DispatchHandle,
    notify: NotifyPolicy,
    filter: SightingFilter,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl EngineObserver {
    pub(crate) fn new(
        tracker: Arc<InventoryTracker>,
        registry: SessionRegistry,
        dispatch: DispatchHandle,
        notify: NotifyPolicy,
        filter: SightingFilter,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            tracker,
            registry,
            dispatch,
            notify,
            filter,
            events,
        }
    }

    fn handle_inventory(&self, id: ConnectionId, items: &[Inventory]) {
        for item in items {
            if let Some(hash) = item.tx_hash() {
                self.record(id, hash);
            } else if !item.kind.is_block() {
                warn!(
                    connection_id = id.get(),
                    inv_type = item.kind.to_u32(),
                    "Ignoring unknown inventory type"
                );
            }
        }
    }

    fn record(&self, id: ConnectionId, hash: TxHash) {
        let outcome = self.tracker.record_sighting(id, hash);

        let kind = if outcome.is_first_sighting_of_hash {
            TRACKED_HASHES.set(self.tracker.len() as f64);
            "first"
        } else if outcome.is_new_peer_for_hash {
            "new_peer"
        } else {
            "duplicate"
        };
        metric_inc!(SIGHTINGS, &[kind]);

        if outcome.is_expected && outcome.is_new_peer_for_hash {
            log_tx_event!(
                debug,
                "Broadcast transaction announced back",
                hash,
                connection_id = id.get(),
                peers = outcome.total_distinct_peers
            );
        }

        if should_notify(self.notify, self.filter, &outcome) {
            self.dispatch.sighting(hash);
        }
    }

    fn publish(&self, event: SupervisorEvent) {
        if self.events.send(event).is_err() {
            debug!("Supervisor gone; session event dropped");
        }
    }
}

impl SessionObserver for EngineObserver {
    fn on_ready(&self, id: ConnectionId, peer: &PeerAddress, handle: SessionHandle) {
        let ready = {
            let mut registry = self.registry.write();
            registry.insert(id, handle);
            registry.len()
        };
        PEERS_READY.set(ready as f64);
        metric_inc!(SESSION_OUTCOMES, &["ready"]);
        log_peer_event!(info, "Peer ready", id, peer, ready_peers = ready);

        self.publish(SupervisorEvent::Ready(id));
    }

    fn on_message(&self, id: ConnectionId, message: &Message) {
        if let Message::Inv(items) = message {
            self.handle_inventory(id, items);
        }
    }

    fn on_closed(&self, id: ConnectionId, reason: CloseReason) {
        let ready = {
            let mut registry = self.registry.write();
            registry.remove(&id);
            registry.len()
        };
        PEERS_READY.set(ready as f64);

        let outcome = match reason {
            CloseReason::Failed(_) => "failed",
            _ => "closed",
        };
        metric_inc!(SESSION_OUTCOMES, &[outcome]);

        self.publish(SupervisorEvent::Closed(id, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{EventDispatcher, StartStatus};
    use radar_wire::InvType;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct Fixture {
        observer: EngineObserver,
        tracker: Arc<InventoryTracker>,
        sightings: std_mpsc::Receiver<TxHash>,
        events: mpsc::UnboundedReceiver<SupervisorEvent>,
        dispatcher: EventDispatcher,
    }

    fn fixture(notify: NotifyPolicy, filter: SightingFilter) -> Fixture {
        let (tx, sightings) = std_mpsc::channel();
        let dispatcher = EventDispatcher::spawn(
            Box::new(move |h: TxHash| {
                let _ = tx.send(h);
            }),
            Box::new(|_: StartStatus| {}),
        )
        .unwrap();
        let tracker = Arc::new(InventoryTracker::new(1000));
        let (events_tx, events) = mpsc::unbounded_channel();
        let observer = EngineObserver::new(
            tracker.clone(),
            SessionRegistry::default(),
            dispatcher.handle(),
            notify,
            filter,
            events_tx,
        );
        Fixture {
            observer,
            tracker,
            sightings,
            events,
            dispatcher,
        }
    }

    fn inv(kind: InvType, byte: u8) -> Inventory {
        Inventory {
            kind,
            hash: [byte; 32],
        }
    }

    fn collect(rx: &std_mpsc::Receiver<TxHash>) -> Vec<TxHash> {
        let mut out = Vec::new();
        while let Ok(h) = rx.recv_timeout(Duration::from_millis(200)) {
            out.push(h);
        }
        out
    }

    #[test]
    fn test_first_sighting_notifies_once() {
        let f = fixture(NotifyPolicy::FirstSighting, SightingFilter::All);
        for peer in 1..=4 {
            f.observer
                .on_message(ConnectionId(peer), &Message::Inv(vec![inv(InvType::Tx, 5)]));
        }

        assert_eq!(collect(&f.sightings), vec![TxHash::new([5; 32])]);
        assert_eq!(f.tracker.count(&TxHash::new([5; 32])), 4);
        f.dispatcher.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_every_new_peer_notifies_per_peer() {
        let f = fixture(NotifyPolicy::EveryNewPeer, SightingFilter::All);
        let message = Message::Inv(vec![inv(InvType::WitnessTx, 6)]);
        f.observer.on_message(ConnectionId(1), &message);
        f.observer.on_message(ConnectionId(2), &message);
        f.observer.on_message(ConnectionId(2), &message);

        assert_eq!(collect(&f.sightings).len(), 2);
        f.dispatcher.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_blocks_and_unknown_types_not_tracked() {
        let f = fixture(NotifyPolicy::FirstSighting, SightingFilter::All);
        f.observer.on_message(
            ConnectionId(1),
            &Message::Inv(vec![
                inv(InvType::Block, 1),
                inv(InvType::CompactBlock, 2),
                inv(InvType::Unknown(99), 3),
                inv(InvType::Error, 4),
            ]),
        );

        assert!(f.tracker.is_empty());
        assert!(collect(&f.sightings).is_empty());
        f.dispatcher.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_expected_only_filter() {
        let f = fixture(NotifyPolicy::FirstSighting, SightingFilter::ExpectedOnly);
        f.tracker.expect(TxHash::new([8; 32]));
        f.observer.on_message(
            ConnectionId(1),
            &Message::Inv(vec![inv(InvType::Tx, 7), inv(InvType::Tx, 8)]),
        );

        assert_eq!(collect(&f.sightings), vec![TxHash::new([8; 32])]);
        assert_eq!(f.tracker.count(&TxHash::new([7; 32])), 1);
        f.dispatcher.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_closed_event_forwarded() {
        let mut f = fixture(NotifyPolicy::FirstSighting, SightingFilter::All);
        f.observer.on_closed(ConnectionId(3), CloseReason::RemoteClosed);

        match f.events.try_recv() {
            Ok(SupervisorEvent::Closed(id, CloseReason::RemoteClosed)) => {
                assert_eq!(id, ConnectionId(3))
            }
            other => panic!("unexpected {other:?}"),
        }
        f.dispatcher.shutdown(Duration::from_secs(1));
    }
}
