//! Mock peer network for engine tests.
//!
//! Every mock peer is a real TCP listener on `127.0.0.1:0` speaking the
//! regtest wire format, driven by its own runtime so the engine under test
//! can be exercised from plain `#[test]` functions.

#![allow(dead_code)]

use radar_discovery::{CandidateSource, StaticCandidates};
use radar_wire::{
    BitcoinCodec, Inventory, Message, MessageCodec, NetAddress, Network, ServiceFlags,
    VersionMessage,
};
use shared_types::{sha256d, PeerAddress, TxHash};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tx_sentinel::{SentinelConfig, SightingCallback, StartStatus, StartedCallback};

/// How a mock peer reacts to a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Completes the handshake and relays.
    Normal,
    /// Reads our `version` and hangs up.
    RefuseHandshake,
    /// Advertises a protocol version below every sane minimum.
    OldVersion,
    /// Accepts the TCP connection and never says anything.
    Blackhole,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Announce(TxHash),
    Disconnect,
}

struct PeerShared {
    behavior: Behavior,
    echo: AtomicBool,
    accepted: AtomicUsize,
    live: AtomicUsize,
    received: Mutex<Vec<Vec<u8>>>,
    control: broadcast::Sender<Control>,
}

/// Handle to one mock peer.
pub struct MockPeer {
    pub address: PeerAddress,
    shared: Arc<PeerShared>,
}

impl MockPeer {
    /// Announce every received `tx` back with an `inv`.
    pub fn set_echo(&self, on: bool) {
        self.shared.echo.store(on, Ordering::SeqCst);
    }

    /// Send an unsolicited `inv` for `hash` on every open connection.
    pub fn announce(&self, hash: TxHash) {
        let _ = self.shared.control.send(Control::Announce(hash));
    }

    /// Drop every open connection.
    pub fn disconnect(&self) {
        let _ = self.shared.control.send(Control::Disconnect);
    }

    /// TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently past the handshake.
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Transaction payloads received.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.shared.received.lock().unwrap().clone()
    }
}

/// A set of mock peers sharing one runtime.
pub struct MockNetwork {
    runtime: Runtime,
    peers: Vec<MockPeer>,
}

impl MockNetwork {
    pub fn spawn(behaviors: &[Behavior]) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mock-peer")
            .enable_all()
            .build()
            .unwrap();

        let peers = behaviors
            .iter()
            .map(|&behavior| {
                let listener = runtime
                    .block_on(TcpListener::bind("127.0.0.1:0"))
                    .unwrap();
                let address = PeerAddress::from(listener.local_addr().unwrap());
                let (control, _) = broadcast::channel(16);
                let shared = Arc::new(PeerShared {
                    behavior,
                    echo: AtomicBool::new(false),
                    accepted: AtomicUsize::new(0),
                    live: AtomicUsize::new(0),
                    received: Mutex::new(Vec::new()),
                    control,
                });
                runtime.spawn(accept_loop(listener, shared.clone()));
                MockPeer { address, shared }
            })
            .collect();

        Self { runtime, peers }
    }

    pub fn uniform(count: usize, behavior: Behavior) -> Self {
        Self::spawn(&vec![behavior; count])
    }

    pub fn peers(&self) -> &[MockPeer] {
        &self.peers
    }

    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.peers.iter().map(|p| p.address.clone()).collect()
    }

    /// A discovery source handing out every peer once, in order.
    pub fn discovery(&self) -> Arc<dyn CandidateSource> {
        Arc::new(StaticCandidates::new(self.addresses()))
    }

    pub fn set_echo(&self, on: bool) {
        for peer in &self.peers {
            peer.set_echo(on);
        }
    }

    pub fn total_live(&self) -> usize {
        self.peers.iter().map(MockPeer::live).sum()
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<PeerShared>) {
    while let Ok((stream, _)) = listener.accept().await {
        shared.accepted.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(stream, shared.clone()));
    }
}

struct Conn {
    stream: TcpStream,
    codec: BitcoinCodec,
    buf: Vec<u8>,
}

impl Conn {
    async fn read(&mut self) -> Option<Message> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.codec.decode(&self.buf) {
                Ok(Some((message, used))) => {
                    self.buf.drain(..used);
                    return Some(message);
                }
                Ok(None) => {}
                Err(_) => return None,
            }
            let n = self.stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn write(&mut self, message: &Message) {
        let frame = self.codec.encode(message);
        let _ = self.stream.write_all(&frame).await;
    }
}

fn mock_version(version: i32) -> VersionMessage {
    VersionMessage {
        version,
        services: ServiceFlags::NETWORK | ServiceFlags::WITNESS,
        timestamp: 1_700_000_000,
        receiver: NetAddress::unspecified(),
        sender: NetAddress::unspecified(),
        nonce: rand::random::<u64>() | 1,
        user_agent: "/mock:0.1/".to_string(),
        start_height: 0,
        relay: true,
    }
}

/// Decrements the live count when a handshaken connection ends.
struct LiveGuard(Arc<PeerShared>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve(stream: TcpStream, shared: Arc<PeerShared>) {
    let mut conn = Conn {
        stream,
        codec: BitcoinCodec::new(Network::Regtest),
        buf: Vec::new(),
    };
    let mut control = shared.control.subscribe();

    match shared.behavior {
        Behavior::RefuseHandshake => {
            let _ = conn.read().await;
            return;
        }
        Behavior::Blackhole => {
            loop {
                tokio::select! {
                    message = conn.read() => if message.is_none() { return },
                    ctl = control.recv() => match ctl {
                        Ok(Control::Disconnect) | Err(broadcast::error::RecvError::Closed) => return,
                        _ => {}
                    },
                }
            }
        }
        Behavior::OldVersion => {
            let _ = conn.read().await;
            conn.write(&Message::Version(mock_version(60002))).await;
            conn.write(&Message::Verack).await;
            while conn.read().await.is_some() {}
            return;
        }
        Behavior::Normal => {}
    }

    // Wait for the sentinel's version, then answer with ours and a verack.
    loop {
        match conn.read().await {
            Some(Message::Version(_)) => break,
            Some(_) => continue,
            None => return,
        }
    }
    conn.write(&Message::Version(mock_version(70016))).await;
    conn.write(&Message::Verack).await;
    shared.live.fetch_add(1, Ordering::SeqCst);
    let _live = LiveGuard(shared.clone());

    loop {
        tokio::select! {
            message = conn.read() => match message {
                None => return,
                Some(Message::Tx(payload)) => {
                    let hash = TxHash::of_payload(&payload);
                    shared.received.lock().unwrap().push(payload);
                    if shared.echo.load(Ordering::SeqCst) {
                        conn.write(&Message::Inv(vec![Inventory::transaction(hash)])).await;
                    }
                }
                Some(Message::Ping(nonce)) => conn.write(&Message::Pong(nonce)).await,
                Some(_) => {}
            },
            ctl = control.recv() => match ctl {
                Ok(Control::Announce(hash)) => {
                    conn.write(&Message::Inv(vec![Inventory::transaction(hash)])).await;
                }
                Ok(Control::Disconnect) | Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }
}

// =============================================================================
// Engine-side helpers
// =============================================================================

/// Regtest config with short timeouts.
pub fn test_config() -> SentinelConfig {
    SentinelConfig::for_testing()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Captures everything the engine reports through its callbacks.
pub struct Recorder {
    sightings: Arc<Mutex<Vec<TxHash>>>,
    status: mpsc::Receiver<StartStatus>,
}

impl Recorder {
    pub fn new() -> (Self, SightingCallback, StartedCallback) {
        let sightings = Arc::new(Mutex::new(Vec::new()));
        let (status_tx, status) = mpsc::channel();

        let sink = sightings.clone();
        let on_sighting: SightingCallback = Box::new(move |hash: TxHash| {
            sink.lock().unwrap().push(hash);
        });
        let on_started: StartedCallback = Box::new(move |status: StartStatus| {
            let _ = status_tx.send(status);
        });

        (Self { sightings, status }, on_sighting, on_started)
    }

    pub fn status(&self, timeout: Duration) -> StartStatus {
        self.status
            .recv_timeout(timeout)
            .expect("on_started never fired")
    }

    /// Whether `on_started` fired again.
    pub fn status_again(&self) -> bool {
        self.status.recv_timeout(Duration::from_millis(200)).is_ok()
    }

    pub fn sightings(&self) -> Vec<TxHash> {
        self.sightings.lock().unwrap().clone()
    }

    pub fn sightings_of(&self, hash: &TxHash) -> usize {
        self.sightings().iter().filter(|h| *h == hash).count()
    }
}

/// A fake serialized transaction, distinct per `seed`.
pub fn fake_tx(seed: u8) -> Vec<u8> {
    let mut tx = vec![0x02, 0x00, 0x00, 0x00, 0x01];
    tx.extend_from_slice(&[seed; 40]);
    tx.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    tx
}

/// A segwit transaction, distinct per `seed`, and its txid computed from the
/// non-witness serialization.
pub fn segwit_tx(seed: u8) -> (Vec<u8>, TxHash) {
    let version = [0x02, 0x00, 0x00, 0x00];
    let locktime = [0x00; 4];

    let mut body = vec![0x01];
    body.extend_from_slice(&[seed; 32]);
    body.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff]);
    body.extend_from_slice(&[0x01, 0x10, 0x27, 0, 0, 0, 0, 0, 0, 0x16, 0x00, 0x14]);
    body.extend_from_slice(&[seed; 20]);
    let witness = [0x02, 0x03, 0xaa, 0xbb, 0xcc, 0x02, 0xdd, 0xee];

    let payload = [&version[..], &[0x00, 0x01], &body, &witness, &locktime].concat();
    let txid = TxHash::new(sha256d(&[&version[..], &body, &locktime].concat()));
    (payload, txid)
}
