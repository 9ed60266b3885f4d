//! Server - accepts connections and dispatches requests to registered
//! handlers.
//!
//! Built through [`ServerBuilder`]: register every handler, then `bind`. The
//! registry is frozen behind an `Arc` before the listener starts, so
//! connection tasks resolve methods without locks. Each accepted connection
//! runs its own task with a private [`FrameBuffer`] and writer task;
//! requests on a connection are dispatched in arrival order and responses
//! are written in completion order, which for a single reader means FIFO.
//!
//! Dispatch failures answer with a non-success status and the error message
//! as payload; they never tear down the connection.

use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::codec::{JsonCodec, PayloadCodec};
use crate::error::Result;
use crate::handler::{BoxError, ServiceRegistry};
use crate::protocol::{
    Envelope, Frame, FrameBuffer, Header, StatusCode, DEFAULT_MAX_BODY_SIZE,
};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Builder for a [`Server`]. Generic over the payload codec, JSON by default.
///
/// # Example
///
/// ```no_run
/// use wirecall::Server;
///
/// # async fn example() -> wirecall::Result<()> {
/// let server = Server::builder()
///     .register("Calculator", "Add", |pair: (i32, i32)| async move {
///         Ok(pair.0 + pair.1)
///     })
///     .bind("127.0.0.1:5000")
///     .await?;
/// println!("listening on {}", server.local_addr());
/// # Ok(())
/// # }
/// ```
pub struct ServerBuilder<C: PayloadCodec = JsonCodec> {
    registry: ServiceRegistry,
    max_body_size: u32,
    read_buffer_size: usize,
    _codec: PhantomData<fn(C)>,
}

impl<C: PayloadCodec> ServerBuilder<C> {
    /// Create a new builder with no registered services.
    pub fn new() -> Self {
        Self {
            registry: ServiceRegistry::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            read_buffer_size: 8 * 1024,
            _codec: PhantomData,
        }
    }

    /// Register a one-parameter method handler.
    pub fn register<F, P, Fut, R>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.registry.register::<C, _, _, _, _>(service, method, handler);
        self
    }

    /// Register a zero-argument method handler.
    pub fn register_nullary<F, Fut, R>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.registry
            .register_nullary::<C, _, _, _>(service, method, handler);
        self
    }

    /// Set the maximum allowed request body size.
    pub fn max_body_size(mut self, max_body_size: u32) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Set the socket read buffer size.
    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    /// Bind the listener and start accepting connections.
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(self.registry);

        debug!(%local_addr, services = registry.service_count(), "server listening");

        let max_body_size = self.max_body_size;
        let read_buffer_size = self.read_buffer_size;
        let accept_task = tokio::spawn(accept_loop::<C>(
            listener,
            registry,
            max_body_size,
            read_buffer_size,
        ));

        Ok(Server {
            local_addr,
            accept_task,
        })
    }
}

impl<C: PayloadCodec> Default for ServerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A running server. Dropping it stops the accept loop.
pub struct Server {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Start building a server with the default JSON codec.
    pub fn builder() -> ServerBuilder<JsonCodec> {
        ServerBuilder::new()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Connections already established keep
    /// running until their peer disconnects.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Accept loop: one connection task per peer.
async fn accept_loop<C: PayloadCodec>(
    listener: TcpListener,
    registry: Arc<ServiceRegistry>,
    max_body_size: u32,
    read_buffer_size: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "connection accepted");
                tokio::spawn(connection_loop::<C>(
                    stream,
                    Arc::clone(&registry),
                    max_body_size,
                    read_buffer_size,
                ));
            }
            Err(e) => {
                // Transient accept errors (e.g. EMFILE) should not kill the
                // listener.
                warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Per-connection task: reassemble requests, dispatch, respond.
///
/// Socket errors and framing errors end only this connection.
async fn connection_loop<C: PayloadCodec>(
    stream: TcpStream,
    registry: Arc<ServiceRegistry>,
    max_body_size: u32,
    read_buffer_size: usize,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(error = %e, "failed to set TCP_NODELAY");
    }
    let (mut reader, write_half) = stream.into_split();
    let (writer, _writer_task) = spawn_writer_task(write_half);

    let mut frame_buffer = FrameBuffer::with_max_body(max_body_size);
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("peer disconnected");
                return;
            }
            Ok(n) => {
                let frames = match frame_buffer.push(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!(error = %e, "framing error, closing connection");
                        return;
                    }
                };
                for frame in frames {
                    let reply = handle_request::<C>(&registry, &frame).await;
                    if send_reply::<C>(&writer, &frame, reply).await.is_err() {
                        // Writer task gone means the socket is dead.
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "socket read failed");
                return;
            }
        }
    }
}

/// Outcome of dispatching one request.
struct Reply {
    status: StatusCode,
    service: String,
    method: String,
    /// Encoded return value on success, raw UTF-8 error message otherwise.
    payload: Vec<u8>,
}

/// Dispatch a request frame through the registry.
///
/// Every failure class maps to a status code and a message payload; the
/// response envelope echoes the request's service and method names when they
/// could be decoded.
async fn handle_request<C: PayloadCodec>(registry: &ServiceRegistry, frame: &Frame) -> Reply {
    let envelope: Envelope = match C::decode(frame.body()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(correlation_id = frame.correlation_id(), error = %e, "undecodable request envelope");
            return Reply {
                status: StatusCode::SerializationError,
                service: String::new(),
                method: String::new(),
                payload: format!("failed to decode request envelope: {}", e).into_bytes(),
            };
        }
    };

    let handler = match registry.lookup(&envelope.service, &envelope.method) {
        Ok(handler) => handler,
        Err(message) => {
            warn!(
                correlation_id = frame.correlation_id(),
                service = %envelope.service,
                method = %envelope.method,
                "unknown service or method"
            );
            return Reply {
                status: StatusCode::UnknownServiceOrMethod,
                service: envelope.service,
                method: envelope.method,
                payload: message.into_bytes(),
            };
        }
    };

    match handler.call(Bytes::from(envelope.payload)).await {
        Ok(encoded) => Reply {
            status: StatusCode::Success,
            service: envelope.service,
            method: envelope.method,
            payload: encoded,
        },
        Err(e) => {
            let status = e.status();
            debug!(
                correlation_id = frame.correlation_id(),
                service = %envelope.service,
                method = %envelope.method,
                ?status,
                "handler dispatch failed"
            );
            Reply {
                status,
                service: envelope.service,
                method: envelope.method,
                payload: e.into_message().into_bytes(),
            }
        }
    }
}

/// Encode and queue a response frame echoing the request's correlation id
/// and frame type.
async fn send_reply<C: PayloadCodec>(
    writer: &WriterHandle,
    request: &Frame,
    reply: Reply,
) -> Result<()> {
    let envelope = Envelope::new(reply.service, reply.method, reply.payload);
    let (status, body) = match C::encode(&envelope) {
        Ok(body) => (reply.status, body),
        Err(e) => {
            error!(correlation_id = request.correlation_id(), error = %e, "failed to encode response envelope");
            // Answer with a minimal fault envelope rather than leaving the
            // caller to time out waiting for a response that never comes.
            let message = format!("failed to encode response envelope: {}", e);
            let fallback = Envelope::new(String::new(), String::new(), message.into_bytes());
            match C::encode(&fallback) {
                Ok(body) => (StatusCode::ServiceFault, body),
                Err(e) => {
                    // The codec cannot encode even an empty envelope;
                    // nothing sensible is left to send.
                    error!(correlation_id = request.correlation_id(), error = %e, "failed to encode fallback envelope");
                    return Ok(());
                }
            }
        }
    };

    let header = Header::response(
        request.correlation_id(),
        body.len() as u32,
        request.header.frame_type,
        status,
    );
    writer.send(OutboundFrame::new(&header, Bytes::from(body))).await
}
