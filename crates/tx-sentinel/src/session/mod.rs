//! # Peer Session
//!
//! One outbound TCP connection to one peer: connect, handshake, then a
//! single task that multiplexes reads, queued writes, keepalive pings and
//! the inactivity deadline until the connection ends or shutdown is
//! signalled.
//!
//! Sessions never retry. Reconnection is the engine's decision, driven by
//! the [`CloseReason`] reported through [`SessionObserver::on_closed`].

pub mod handshake;


use radar_wire::{Message, MessageCodec};
use shared_types::{ConnectionId, PeerAddress};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::config::SentinelConfig;
use crate::domain::{PayloadStore, Peer, PeerState};
use crate::errors::{ConnectError, HandshakeError, SendError, SessionError};
use crate::ports::SessionObserver;

/// Read buffer chunk size.
pub(crate) const READ_CHUNK: usize = 16 * 1024;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Shutdown was signalled.
    Stopped,
    /// The peer closed the connection cleanly.
    RemoteClosed,
    /// Connect, handshake or the running session failed.
    Failed(SessionError),
}

impl CloseReason {
    /// Final state of the peer after closing for this reason.
    pub fn final_state(&self) -> PeerState {
        match self {
            CloseReason::Failed(_) => PeerState::Failed,
            _ => PeerState::Closed,
        }
    }

    /// Label for the session outcome metric.
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Stopped => "stopped",
            CloseReason::RemoteClosed => "remote_closed",
            CloseReason::Failed(SessionError::Connect(ConnectError::Handshake(_))) => {
                "handshake_failed"
            }
            CloseReason::Failed(SessionError::Connect(_)) => "connect_failed",
            CloseReason::Failed(_) => "failed",
        }
    }
}

/// Cloneable sender for one Ready session.
///
/// Frames are queued to the session task, which writes them in order.
/// Handles outlive their session safely; sends after close report
/// [`SendError::ConnectionLost`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Arc<[u8]>>,
    ready: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Queue an already-framed message.
    ///
    /// # Errors
    ///
    /// - [`SendError::NotReady`] once the session has started closing
    /// - [`SendError::ConnectionLost`] if the session task is gone
    /// - [`SendError::QueueFull`] if the peer is not draining its queue
    pub fn send_frame(&self, frame: Arc<[u8]>) -> Result<(), SendError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(SendError::NotReady);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ConnectionLost,
        })
    }

    /// Encode and queue `message`.
    pub fn send(&self, codec: &dyn MessageCodec, message: &Message) -> Result<(), SendError> {
        self.send_frame(codec.encode(message).into())
    }
}

/// Shared, read-only inputs for every session of one engine run.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<SentinelConfig>,
    pub codec: Arc<dyn MessageCodec>,
    pub payloads: Arc<PayloadStore>,
    /// Our `version` nonce, for self-connection detection.
    pub local_nonce: u64,
}

impl SessionContext {
    pub fn new(
        config: Arc<SentinelConfig>,
        codec: Arc<dyn MessageCodec>,
        payloads: Arc<PayloadStore>,
    ) -> Self {
        Self {
            config,
            codec,
            payloads,
            local_nonce: rand::random(),
        }
    }
}

/// A handshaken connection, ready to run.
pub struct PeerSession {
    peer: Peer,
    stream: TcpStream,
    read_buf: Vec<u8>,
    early: Vec<Message>,
    pending_ping: Option<u64>,
    ctx: SessionContext,
}

impl PeerSession {
    /// Open a TCP connection to `address` and complete the handshake.
    ///
    /// Both steps are bounded by the configured timeouts.
    pub async fn connect(
        id: ConnectionId,
        address: PeerAddress,
        ctx: SessionContext,
    ) -> Result<Self, ConnectError> {
        let mut peer = Peer::new(address, id);
        let timeouts = &ctx.config.timeouts;

        let connect_timeout = timeouts.connect();
        let target = peer.address.to_connect_string();
        let mut stream = match time::timeout(connect_timeout, TcpStream::connect(&target)).await {
            Err(_) => return Err(ConnectError::Timeout(connect_timeout)),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(ConnectError::Refused(target.clone()))
            }
            Ok(Err(e)) => return Err(ConnectError::Unreachable(format!("{target}: {e}"))),
            Ok(Ok(stream)) => stream,
        };
        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "set_nodelay failed");
        }
        advance(&mut peer, PeerState::Handshaking);

        let handshake_timeout = timeouts.handshake();
        let mut read_buf = Vec::with_capacity(READ_CHUNK);
        let completed = time::timeout(
            handshake_timeout,
            handshake::perform(&mut stream, &mut read_buf, &ctx),
        )
        .await
        .map_err(|_| HandshakeError::Timeout(handshake_timeout))??;
        let remote_version = completed.version;

        advance(&mut peer, PeerState::Ready);
        peer.touch();
        debug!(
            connection_id = id.get(),
            peer = %peer.address,
            version = remote_version.version,
            user_agent = %remote_version.user_agent,
            "Handshake complete"
        );

        Ok(Self {
            peer,
            stream,
            read_buf,
            early: completed.early,
            pending_ping: None,
            ctx,
        })
    }

    /// Run until the connection ends or `shutdown` flips to true.
    ///
    /// Announces readiness through `observer.on_ready` first. Does not call
    /// `on_closed`; the returned reason is for the caller to report.
    pub async fn run(
        mut self,
        observer: &dyn SessionObserver,
        mut shutdown: watch::Receiver<bool>,
    ) -> CloseReason {
        let id = self.peer.connection_id;
        let (outbound, mut outbound_rx) = mpsc::channel(self.ctx.config.policy.outbound_queue);
        let ready = Arc::new(AtomicBool::new(true));
        let handle = SessionHandle {
            id,
            outbound,
            ready: ready.clone(),
        };
        observer.on_ready(id, &self.peer.address, handle);

        let reason = self
            .event_loop(observer, &mut outbound_rx, &mut shutdown)
            .await;
        ready.store(false, Ordering::Release);
        outbound_rx.close();

        if let CloseReason::Failed(_) = reason {
            advance(&mut self.peer, PeerState::Failed);
        } else {
            advance(&mut self.peer, PeerState::Closing);
            let _ = time::timeout(Duration::from_millis(200), self.stream.shutdown()).await;
            advance(&mut self.peer, PeerState::Closed);
        }
        reason
    }

    async fn event_loop(
        &mut self,
        observer: &dyn SessionObserver,
        outbound_rx: &mut mpsc::Receiver<Arc<[u8]>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> CloseReason {
        let timeouts = self.ctx.config.timeouts.clone();
        let inactivity = timeouts.inactivity();
        let ping_interval = timeouts.ping_interval();
        let mut ping_timer = time::interval_at(time::Instant::now() + ping_interval, ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut chunk = vec![0u8; READ_CHUNK];

        // Messages sent before the peer's verack, then frames that arrived
        // together with the handshake.
        for message in std::mem::take(&mut self.early) {
            if let Err(e) = self.handle_message(message, observer).await {
                return CloseReason::Failed(e);
            }
        }
        if let Err(e) = self.drain_frames(observer).await {
            return CloseReason::Failed(e);
        }

        loop {
            let idle_deadline = time::Instant::from_std(self.peer.last_activity() + inactivity);

            tokio::select! {
                _ = wait_for_shutdown(shutdown) => return CloseReason::Stopped,

                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = self.write_frame(&frame).await {
                        return CloseReason::Failed(e);
                    }
                }

                read = self.stream.read(&mut chunk) => match read {
                    Ok(0) => return CloseReason::RemoteClosed,
                    Ok(n) => {
                        self.peer.touch();
                        self.read_buf.extend_from_slice(&chunk[..n]);
                        if let Err(e) = self.drain_frames(observer).await {
                            return CloseReason::Failed(e);
                        }
                    }
                    Err(e) => return CloseReason::Failed(e.into()),
                },

                _ = ping_timer.tick() => {
                    if let Some(nonce) = self.pending_ping {
                        trace!(connection_id = self.peer.connection_id.get(), nonce, "Previous ping unanswered");
                    }
                    let nonce: u64 = rand::random();
                    self.pending_ping = Some(nonce);
                    if let Err(e) = self.write_message(&Message::Ping(nonce)).await {
                        return CloseReason::Failed(e);
                    }
                }

                _ = time::sleep_until(idle_deadline) => {
                    return CloseReason::Failed(SessionError::Inactive(inactivity));
                }
            }
        }
    }

    /// Decode and handle every complete frame in the read buffer.
    async fn drain_frames(&mut self, observer: &dyn SessionObserver) -> Result<(), SessionError> {
        while let Some((message, used)) = self.ctx.codec.decode(&self.read_buf)? {
            self.read_buf.drain(..used);
            self.handle_message(message, observer).await?;
        }
        Ok(())
    }

    async fn handle_message(
        &mut self,
        message: Message,
        observer: &dyn SessionObserver,
    ) -> Result<(), SessionError> {
        let id = self.peer.connection_id;
        trace!(connection_id = id.get(), command = message.command(), "Received");

        match &message {
            Message::Version(_) | Message::Verack => {
                let count = self.peer.record_violation();
                warn!(
                    connection_id = id.get(),
                    peer = %self.peer.address,
                    command = message.command(),
                    violations = count,
                    "Handshake message after handshake"
                );
                if count > self.ctx.config.policy.max_violations {
                    return Err(SessionError::TooManyViolations(count));
                }
                return Ok(());
            }
            Message::Ping(nonce) => self.write_message(&Message::Pong(*nonce)).await?,
            Message::Pong(nonce) => {
                if self.pending_ping == Some(*nonce) {
                    self.pending_ping = None;
                }
            }
            Message::GetData(items) => {
                for item in items {
                    let Some(hash) = item.tx_hash() else { continue };
                    if let Some(payload) = self.ctx.payloads.get(&hash) {
                        trace!(connection_id = id.get(), tx_hash = %hash, "Serving getdata");
                        self.write_message(&Message::Tx(payload.to_vec())).await?;
                    }
                }
            }
            _ => {}
        }

        observer.on_message(id, &message);
        Ok(())
    }

    async fn write_message(&mut self, message: &Message) -> Result<(), SessionError> {
        let frame = self.ctx.codec.encode(message);
        self.write_frame(&frame).await
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        let deadline = self.ctx.config.timeouts.handshake();
        match time::timeout(deadline, self.stream.write_all(frame)).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(SessionError::Io(format!("write timed out after {deadline:?}"))),
        }
    }
}

/// Drive one session from connect to close.
///
/// `observer.on_closed` fires exactly once, whatever happens.
pub async fn run_session(
    id: ConnectionId,
    address: PeerAddress,
    ctx: SessionContext,
    observer: Arc<dyn SessionObserver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let connecting = PeerSession::connect(id, address.clone(), ctx);
    let connected = tokio::select! {
        result = connecting => result,
        _ = wait_for_shutdown(&mut shutdown) => Err(ConnectError::Aborted),
    };

    let reason = match connected {
        Ok(session) => session.run(observer.as_ref(), shutdown).await,
        Err(ConnectError::Aborted) => CloseReason::Stopped,
        Err(e) => {
            debug!(connection_id = id.get(), peer = %address, error = %e, "Connect failed");
            CloseReason::Failed(e.into())
        }
    };
    observer.on_closed(id, reason);
}

/// Resolve once shutdown is signalled or the signal sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *shutdown.borrow();
        if stopping || shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn advance(peer: &mut Peer, next: PeerState) {
    let from = peer.state();
    match peer.transition(next) {
        Ok(()) if from != next => trace!(
            connection_id = peer.connection_id.get(),
            peer = %peer.address,
            %from,
            state = %next,
            "Session state changed"
        ),
        Ok(()) => {}
        Err(e) => warn!(connection_id = peer.connection_id.get(), error = %e, "Ignoring state change"),
    }
}
