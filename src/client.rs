//! Client - connects to a server and correlates requests with responses.
//!
//! One connection carries any number of in-flight calls. Each call gets a
//! correlation id from an atomic counter and parks a oneshot sender in a
//! concurrent pending table; the receiver task reassembles frames off the
//! socket and routes each response to its sender. Two call styles:
//!
//! - [`Client::call`] blocks the caller (with an optional timeout) until the
//!   response arrives.
//! - [`Client::call_deferred`] returns a [`PendingReply`] handle immediately;
//!   a background sweeper task times out abandoned entries.
//!
//! A pending call completes exactly once: removal from the table is the
//! atomic hand-off point, and the oneshot sender is consumed by whichever
//! side wins it.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, warn};

use crate::codec::{JsonCodec, PayloadCodec};
use crate::error::{Result, WirecallError};
use crate::protocol::{Envelope, Frame, FrameBuffer, Header, StatusCode, DEFAULT_MAX_BODY_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How often the sweeper scans for timed-out deferred calls.
    pub sweep_interval: Duration,
    /// Extra time past a deferred call's deadline before the sweeper removes
    /// it. Keeps a response that arrives right at the deadline from racing
    /// the sweep.
    pub sweep_grace: Duration,
    /// Maximum allowed response body size.
    pub max_body_size: u32,
    /// Size of the socket read buffer.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            sweep_grace: Duration::from_secs(1),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            read_buffer_size: 8 * 1024,
        }
    }
}

/// A response as delivered by the receiver task: status byte plus the
/// envelope's payload bytes.
#[derive(Debug)]
struct CallReply {
    status: u8,
    payload: Bytes,
}

/// A parked call waiting for its response.
///
/// The oneshot sender is consumed on completion, so a call can only ever be
/// completed once; removal from the pending table decides who completes it.
enum PendingCall {
    /// A blocking call; the caller holds the receiver and handles its own
    /// timeout.
    Waiter(oneshot::Sender<Result<CallReply>>),
    /// A deferred call; the sweeper times it out if the deadline (plus
    /// grace) passes first. `None` means no deadline.
    Deferred {
        tx: oneshot::Sender<Result<CallReply>>,
        deadline: Option<Instant>,
    },
}

impl PendingCall {
    fn complete(self, result: Result<CallReply>) {
        let tx = match self {
            Self::Waiter(tx) => tx,
            Self::Deferred { tx, .. } => tx,
        };
        // The receiver may already be gone (caller dropped the future).
        let _ = tx.send(result);
    }
}

type PendingTable = Arc<DashMap<u32, PendingCall>>;

/// RPC client over a single persistent TCP connection.
///
/// Generic over the payload codec, JSON by default.
///
/// # Example
///
/// ```no_run
/// use wirecall::Client;
///
/// # async fn example() -> wirecall::Result<()> {
/// let client: Client = Client::connect("127.0.0.1:5000").await?;
/// let sum: i32 = client
///     .call("Calculator", "Add", &(1, 2), Some(std::time::Duration::from_secs(5)))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Client<C: PayloadCodec = JsonCodec> {
    writer: WriterHandle,
    pending: PendingTable,
    next_id: AtomicU32,
    closed: Arc<AtomicBool>,
    receive_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
    _codec: PhantomData<fn(C)>,
}

impl<C: PayloadCodec> Client<C> {
    /// Connect with the default configuration.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with(addr, ClientConfig::default()).await
    }

    /// Connect with a custom configuration.
    pub async fn connect_with(addr: impl ToSocketAddrs, config: ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (writer, _writer_task) = spawn_writer_task(write_half);
        let pending: PendingTable = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let receive_task = tokio::spawn(receive_loop::<C>(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&closed),
            config.max_body_size,
            config.read_buffer_size,
        ));
        let sweep_task = tokio::spawn(sweep_loop(
            Arc::clone(&pending),
            config.sweep_interval,
            config.sweep_grace,
        ));

        Ok(Self {
            writer,
            pending,
            next_id: AtomicU32::new(0),
            closed,
            receive_task,
            sweep_task,
            _codec: PhantomData,
        })
    }

    /// Call a one-parameter method and wait for the decoded return value.
    ///
    /// `timeout` of `None` waits indefinitely. On timeout the pending entry
    /// is removed and the late response, if it ever arrives, is dropped.
    pub async fn call<P, R>(
        &self,
        service: &str,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = C::encode(params)?;
        let bytes = self.call_raw(service, method, payload, timeout).await?;
        C::decode(&bytes)
    }

    /// Call a zero-argument method.
    pub async fn call_nullary<R>(
        &self,
        service: &str,
        method: &str,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        R: DeserializeOwned,
    {
        self.call(service, method, &(), timeout).await
    }

    /// Call a method with an already-encoded payload and return the raw
    /// response payload bytes.
    pub async fn call_raw(
        &self,
        service: &str,
        method: &str,
        payload: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let (tx, mut rx) = oneshot::channel();
        let id = self.register_pending(PendingCall::Waiter(tx))?;
        self.send_request(id, service, method, payload).await?;

        let reply = match timeout {
            None => rx.await.map_err(|_| WirecallError::ConnectionClosed)??,
            Some(duration) => match time::timeout(duration, &mut rx).await {
                Ok(received) => received.map_err(|_| WirecallError::ConnectionClosed)??,
                Err(_elapsed) => {
                    if self.pending.remove(&id).is_some() {
                        // We won the removal race; any late response for this
                        // id gets dropped by the receiver.
                        return Err(WirecallError::Timeout);
                    }
                    // The receiver removed the entry first, so the reply is
                    // already buffered in the channel.
                    match rx.try_recv() {
                        Ok(received) => received?,
                        Err(_) => return Err(WirecallError::Timeout),
                    }
                }
            },
        };

        reply_to_result(reply)
    }

    /// Start a call and return a handle to collect the result later.
    ///
    /// With a `timeout`, the sweeper task completes the call as `Timeout`
    /// once the deadline plus the configured grace window has passed.
    pub async fn call_deferred<P>(
        &self,
        service: &str,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<PendingReply<C>>
    where
        P: Serialize,
    {
        let payload = C::encode(params)?;
        let (tx, rx) = oneshot::channel();
        let deadline = timeout.map(|d| Instant::now() + d);
        let id = self.register_pending(PendingCall::Deferred { tx, deadline })?;
        self.send_request(id, service, method, payload).await?;

        Ok(PendingReply {
            correlation_id: id,
            rx,
            _codec: PhantomData,
        })
    }

    /// Allocate a correlation id and park the call in the pending table.
    ///
    /// Once the receive loop has died no response can ever arrive, so new
    /// calls are rejected immediately instead of waiting out their timeout.
    fn register_pending(&self, call: PendingCall) -> Result<u32> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WirecallError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        match self.pending.entry(id) {
            Entry::Occupied(_) => return Err(WirecallError::DuplicateCorrelationId(id)),
            Entry::Vacant(slot) => {
                slot.insert(call);
            }
        }

        // The receive loop may have failed between the check above and the
        // insert; re-check so the entry cannot slip past fail_all and park
        // the caller forever.
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(&id);
            return Err(WirecallError::ConnectionClosed);
        }
        Ok(id)
    }

    /// Encode the envelope and hand the frame to the writer task. On failure
    /// the pending entry is removed so it cannot leak.
    async fn send_request(
        &self,
        id: u32,
        service: &str,
        method: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let envelope = Envelope::new(service, method, payload);
        let body = match C::encode(&envelope) {
            Ok(body) => body,
            Err(e) => {
                self.pending.remove(&id);
                return Err(e);
            }
        };

        let header = Header::request(id, body.len() as u32);
        let frame = OutboundFrame::new(&header, Bytes::from(body));
        if let Err(e) = self.writer.send(frame).await {
            self.pending.remove(&id);
            return Err(WirecallError::SendFailure(e.to_string()));
        }
        Ok(())
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Whether the connection's receive loop has terminated. Calls on a
    /// closed client fail with [`WirecallError::ConnectionClosed`].
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<C: PayloadCodec> Drop for Client<C> {
    fn drop(&mut self) {
        self.receive_task.abort();
        self.sweep_task.abort();
    }
}

/// Handle for a deferred call's eventual result.
pub struct PendingReply<C: PayloadCodec = JsonCodec> {
    correlation_id: u32,
    rx: oneshot::Receiver<Result<CallReply>>,
    _codec: PhantomData<fn(C)>,
}

impl<C: PayloadCodec> PendingReply<C> {
    /// The correlation id assigned to this call.
    pub fn correlation_id(&self) -> u32 {
        self.correlation_id
    }

    /// Wait for the decoded return value.
    pub async fn wait<R: DeserializeOwned>(self) -> Result<R> {
        let bytes = self.wait_raw().await?;
        C::decode(&bytes)
    }

    /// Wait for the raw response payload bytes.
    pub async fn wait_raw(self) -> Result<Bytes> {
        let reply = self
            .rx
            .await
            .map_err(|_| WirecallError::ConnectionClosed)??;
        reply_to_result(reply)
    }
}

/// Map a reply's status byte to success payload or error.
fn reply_to_result(reply: CallReply) -> Result<Bytes> {
    match StatusCode::from_u8(reply.status) {
        Some(StatusCode::Success) => Ok(reply.payload),
        Some(code) => Err(WirecallError::Remote {
            code,
            message: String::from_utf8_lossy(&reply.payload).into_owned(),
        }),
        None => Err(WirecallError::Protocol(format!(
            "unknown status code {}",
            reply.status
        ))),
    }
}

/// Receiver task: reassemble frames and route each to its pending call.
///
/// Exits on EOF, read error, or a framing error; all still-pending calls are
/// then failed with `ConnectionClosed`.
async fn receive_loop<C: PayloadCodec>(
    mut reader: OwnedReadHalf,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    max_body_size: u32,
    read_buffer_size: usize,
) {
    let mut frame_buffer = FrameBuffer::with_max_body(max_body_size);
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("connection closed by peer");
                break;
            }
            Ok(n) => match frame_buffer.push(&buf[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        complete_call::<C>(&pending, frame);
                    }
                }
                Err(e) => {
                    error!(error = %e, "framing error, closing connection");
                    break;
                }
            },
            Err(e) => {
                error!(error = %e, "socket read failed");
                break;
            }
        }
    }

    // Flag first, then drain: a call that registers after the flag flip is
    // rejected at registration, one that registered before it is failed here.
    closed.store(true, Ordering::Release);
    fail_all(&pending);
}

/// Route one response frame to its pending call.
fn complete_call<C: PayloadCodec>(pending: &DashMap<u32, PendingCall>, frame: Frame) {
    let id = frame.correlation_id();
    let envelope: Envelope = match C::decode(frame.body()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(correlation_id = id, error = %e, "dropping response with undecodable envelope");
            return;
        }
    };

    match pending.remove(&id) {
        Some((_, call)) => call.complete(Ok(CallReply {
            status: frame.status(),
            payload: Bytes::from(envelope.payload),
        })),
        None => {
            // Timed out or never existed.
            warn!(correlation_id = id, "dropping response with no pending call");
        }
    }
}

/// Fail every pending call. Used when the connection goes away.
fn fail_all(pending: &DashMap<u32, PendingCall>) {
    let ids: Vec<u32> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, call)) = pending.remove(&id) {
            call.complete(Err(WirecallError::ConnectionClosed));
        }
    }
}

/// Sweeper task: periodically time out deferred calls past their deadline.
async fn sweep_loop(pending: PendingTable, interval: Duration, grace: Duration) {
    let mut ticker = time::interval(interval);
    loop {
        ticker.tick().await;

        let now = Instant::now();
        let expired: Vec<u32> = pending
            .iter()
            .filter_map(|entry| match entry.value() {
                PendingCall::Deferred {
                    deadline: Some(deadline),
                    ..
                } if now >= *deadline + grace => Some(*entry.key()),
                _ => None,
            })
            .collect();

        for id in expired {
            // The receiver may complete the call between the scan and this
            // remove; losing that race is fine.
            if let Some((_, call)) = pending.remove(&id) {
                debug!(correlation_id = id, "sweeping timed-out deferred call");
                call.complete(Err(WirecallError::Timeout));
            }
        }
    }
}
