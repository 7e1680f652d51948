//! Websocket connection wrapper: bounded message queues, the read/write
//! pumps, and the ping/pong keep-alive.
//!
//! Each connection owns its transport exclusively. The read pump blocks on
//! the socket, decodes frames into [`Payload`]s and parks them on the
//! inbound queue for the owning service to drain on its tick. The write
//! pump drains the outbound queue and multiplexes a periodic ping; the pong
//! handler resets the read deadline and measures round-trip latency. A
//! transport failure is reported exactly once to the owning service's
//! disconnect channel; the scoped close path suppresses that report via a
//! pending-kill flag shared by both pumps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use blade2_types::{B2Code, Payload};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Size of each connection's message queues (both directions).
pub const MESSAGE_BUFFER_SIZE: usize = 32;

/// Maximum duration to wait before a write is considered to have failed.
const MAX_WRITE_WAIT: Duration = Duration::from_secs(8);

/// Maximum duration with no pong before the connection is considered dead.
const PONG_WAIT: Duration = Duration::from_secs(16);

/// Interval between pings: 0.8 of the pong deadline.
const PING_PERIOD: Duration = Duration::from_millis(12_800);

/// Time to let the write pump drain the farewell before the socket drops.
const CLOSE_WAIT: Duration = Duration::from_secs(1);

/// A request to remove a client from its service, carrying enough identity
/// for the serializer to resolve the client without holding a reference.
#[derive(Clone, Debug)]
pub struct DisconnectRequest {
    pub db_id: u64,
    /// The match the client was seated in; `None` for matchmaking clients.
    pub match_id: Option<u64>,
    /// UUID of the connection the request refers to. A mismatch against the
    /// currently seated connection marks the request as stale.
    pub uuid: Uuid,
    pub reason: B2Code,
    pub message: String,
}

/// Frames travelling through the outbound queue.
#[derive(Clone, Debug)]
pub enum OutboundFrame {
    Frame(Payload),
    /// Farewell: written, then the socket is released after [`CLOSE_WAIT`].
    Close(Payload),
}

/// A live client connection as seen by the owning service.
pub struct Connection {
    uuid: Uuid,
    joined: Instant,
    outbound: mpsc::Sender<OutboundFrame>,
    inbound: mpsc::Receiver<Payload>,
    latency_ms: Arc<AtomicU64>,
    pending_kill: Arc<AtomicBool>,
}

impl Connection {
    /// Wraps an upgraded websocket, spawning its two pump tasks. Transport
    /// failures are reported to `disconnect_tx` tagged with the supplied
    /// identity.
    pub fn spawn(
        socket: WebSocket,
        db_id: u64,
        match_id: Option<u64>,
        disconnect_tx: mpsc::Sender<DisconnectRequest>,
    ) -> Connection {
        let uuid = Uuid::new_v4();
        let (out_tx, out_rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let (in_tx, in_rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let latency_ms = Arc::new(AtomicU64::new(0));
        let pending_kill = Arc::new(AtomicBool::new(false));
        let last_ping = Arc::new(Mutex::new(Instant::now()));

        let (sink, stream) = socket.split();

        let reporter = DisconnectReporter {
            db_id,
            match_id,
            uuid,
            sender: disconnect_tx,
            pending_kill: pending_kill.clone(),
        };

        tokio::spawn(write_pump(
            sink,
            out_rx,
            last_ping.clone(),
            reporter.clone(),
        ));
        tokio::spawn(read_pump(
            stream,
            in_tx,
            last_ping,
            latency_ms.clone(),
            reporter,
        ));

        Connection {
            uuid,
            joined: Instant::now(),
            outbound: out_tx,
            inbound: in_rx,
            latency_ms,
            pending_kill,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn joined(&self) -> Instant {
        self.joined
    }

    /// Measured round-trip latency of the most recent ping/pong exchange.
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::Relaxed))
    }

    /// Non-blocking enqueue onto the outbound queue. A saturated queue means
    /// the client stopped draining frames, so the connection is condemned
    /// rather than blocking the serializer.
    pub fn send(&self, payload: Payload) {
        match self.outbound.try_send(OutboundFrame::Frame(payload)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(uuid = %self.uuid, "outbound queue saturated, condemning connection");
                self.pending_kill.store(true, Ordering::SeqCst);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Consumes the next queued inbound payload, if any.
    pub fn poll_inbound(&mut self) -> Option<Payload> {
        self.inbound.try_recv().ok()
    }

    /// Sends a final message and releases the transport after a short drain
    /// period. Non-reentrant: only the first call has any effect, and the
    /// pumps exit without reporting a second disconnect.
    pub fn close(&self, farewell: Payload) {
        if self.pending_kill.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.outbound.try_send(OutboundFrame::Close(farewell)).is_err() {
            debug!(uuid = %self.uuid, "close frame dropped, pumps already gone");
        }
    }

    /// An in-memory connection with no pumps behind it, for service tests.
    /// The remote half plays the role of the client.
    #[cfg(any(test, feature = "mocks"))]
    pub fn in_memory() -> (Connection, RemoteHandle) {
        let uuid = Uuid::new_v4();
        let (out_tx, out_rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let (in_tx, in_rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let latency_ms = Arc::new(AtomicU64::new(0));
        let connection = Connection {
            uuid,
            joined: Instant::now(),
            outbound: out_tx,
            inbound: in_rx,
            latency_ms: latency_ms.clone(),
            pending_kill: Arc::new(AtomicBool::new(false)),
        };
        let remote = RemoteHandle {
            uuid,
            outbound: out_rx,
            inbound: in_tx,
            latency_ms,
        };
        (connection, remote)
    }
}

/// The client-side half of an in-memory connection.
#[cfg(any(test, feature = "mocks"))]
pub struct RemoteHandle {
    pub uuid: Uuid,
    outbound: mpsc::Receiver<OutboundFrame>,
    inbound: mpsc::Sender<Payload>,
    latency_ms: Arc<AtomicU64>,
}

#[cfg(any(test, feature = "mocks"))]
impl RemoteHandle {
    /// Simulates a frame arriving from the client.
    pub fn send(&self, payload: Payload) {
        self.inbound.try_send(payload).expect("inbound queue full");
    }

    /// Next frame the server queued for this client, if any.
    pub fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.outbound.try_recv().ok()
    }

    /// Drains queued frames into `(code, is_close)` tuples.
    pub fn drain_codes(&mut self) -> Vec<(u16, bool)> {
        let mut codes = Vec::new();
        while let Some(frame) = self.next_frame() {
            match frame {
                OutboundFrame::Frame(payload) => codes.push((payload.code, false)),
                OutboundFrame::Close(payload) => codes.push((payload.code, true)),
            }
        }
        codes
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Shared disconnect-report plumbing for the two pumps. The report is a
/// no-op once the connection is pending kill, so a scoped close never
/// produces a trailing disconnect.
#[derive(Clone)]
struct DisconnectReporter {
    db_id: u64,
    match_id: Option<u64>,
    uuid: Uuid,
    sender: mpsc::Sender<DisconnectRequest>,
    pending_kill: Arc<AtomicBool>,
}

impl DisconnectReporter {
    fn pending_kill(&self) -> bool {
        self.pending_kill.load(Ordering::SeqCst)
    }

    fn report(&self, message: impl Into<String>) {
        if self.pending_kill() {
            return;
        }
        let request = DisconnectRequest {
            db_id: self.db_id,
            match_id: self.match_id,
            uuid: self.uuid,
            reason: B2Code::UnknownConnectionError,
            message: message.into(),
        };
        if self.sender.try_send(request).is_err() {
            warn!(uuid = %self.uuid, "disconnect channel full, dropping report");
        }
    }
}

/// Drains the outbound queue onto the socket and multiplexes the keep-alive
/// ping.
async fn write_pump(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<OutboundFrame>,
    last_ping: Arc<Mutex<Instant>>,
    reporter: DisconnectReporter,
) {
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so pings start one
    // period after connect.
    ping.tick().await;

    loop {
        tokio::select! {
            frame = out_rx.recv() => match frame {
                Some(OutboundFrame::Frame(payload)) => {
                    let write = timeout(
                        MAX_WRITE_WAIT,
                        sink.send(Message::Text(payload.to_json())),
                    )
                    .await;
                    match write {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            reporter.report(err.to_string());
                            break;
                        }
                        Err(_) => {
                            reporter.report("write timed out");
                            break;
                        }
                    }
                }
                Some(OutboundFrame::Close(payload)) => {
                    let _ = timeout(
                        MAX_WRITE_WAIT,
                        sink.send(Message::Text(payload.to_json())),
                    )
                    .await;
                    tokio::time::sleep(CLOSE_WAIT).await;
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                None => break,
            },
            // The ping arm is never an exit path: a scoped close may have
            // queued its farewell in the same instant, and that frame must
            // still drain through the queue arm. The pump only exits via a
            // Close frame, the channel ending, or a write error.
            _ = ping.tick() => {
                *last_ping.lock().expect("ping clock poisoned") = Instant::now();
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    reporter.report("ping write failed");
                    break;
                }
            }
        }
    }
}

/// Blocks on the socket, parking decoded payloads on the inbound queue. The
/// read deadline starts at one pong period and is only pushed forward by
/// pongs, so a silent peer is detected even while it keeps the TCP stream
/// open.
async fn read_pump(
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    in_tx: mpsc::Sender<Payload>,
    last_ping: Arc<Mutex<Instant>>,
    latency_ms: Arc<AtomicU64>,
    reporter: DisconnectReporter,
) {
    let mut deadline = Instant::now() + PONG_WAIT;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                reporter.report("read deadline exceeded");
                break;
            }
            Ok(None) => {
                reporter.report("connection closed");
                break;
            }
            Ok(Some(Err(err))) => {
                reporter.report(err.to_string());
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        if reporter.pending_kill() {
            break;
        }

        match frame {
            Message::Text(text) => {
                let payload = Payload::from_bytes(text.as_bytes());
                if in_tx.try_send(payload).is_err() {
                    reporter.report("inbound queue saturated");
                    break;
                }
            }
            Message::Binary(bytes) => {
                let payload = Payload::from_bytes(&bytes);
                if in_tx.try_send(payload).is_err() {
                    reporter.report("inbound queue saturated");
                    break;
                }
            }
            Message::Pong(_) => {
                let now = Instant::now();
                deadline = now + PONG_WAIT;
                let sent = *last_ping.lock().expect("ping clock poisoned");
                latency_ms.store(
                    now.saturating_duration_since(sent).as_millis() as u64,
                    Ordering::Relaxed,
                );
            }
            // The websocket layer answers pings for us.
            Message::Ping(_) => {}
            Message::Close(_) => {
                reporter.report("client closed connection");
                break;
            }
        }
    }
}
