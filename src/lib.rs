//! # wirecall
//!
//! Minimal RPC transport over persistent TCP connections.
//!
//! A client sends `(service, method, payload)` requests and receives
//! correlated responses over a single connection; a server dispatches framed
//! requests to registered async handlers. Frames are length-prefixed with a
//! 16-byte marker-delimited header, so the stream resynchronizes after
//! garbage and reassembles cleanly from arbitrary read boundaries.
//!
//! ## Features
//!
//! - **Binary framing**: fixed 16-byte header with start/end markers,
//!   correlation id, body length, and status code
//! - **Marker-scanning recovery**: a reader joining mid-stream or hitting
//!   garbage finds the next genuine frame boundary
//! - **Request correlation**: any number of in-flight calls per connection,
//!   blocking or deferred, with timeout sweeping
//! - **Typed handlers**: async functions with serde-encoded parameters and
//!   return values; failures map to status codes instead of dropped
//!   connections
//! - **Pluggable codec**: JSON by default, any [`PayloadCodec`] impl works
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wirecall::{Client, Server};
//!
//! # async fn example() -> wirecall::Result<()> {
//! let server = Server::builder()
//!     .register("Calculator", "Add", |pair: (i32, i32)| async move {
//!         Ok(pair.0 + pair.1)
//!     })
//!     .bind("127.0.0.1:0")
//!     .await?;
//!
//! let client: Client = Client::connect(server.local_addr()).await?;
//! let sum: i32 = client
//!     .call("Calculator", "Add", &(1, 2), Some(Duration::from_secs(5)))
//!     .await?;
//! assert_eq!(sum, 3);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;

mod writer;

pub use client::{Client, ClientConfig, PendingReply};
pub use codec::{JsonCodec, PayloadCodec};
pub use error::{Result, WirecallError};
pub use handler::{BoxError, ServiceRegistry};
pub use protocol::{Envelope, Frame, FrameBuffer, Header, StatusCode};
pub use server::{Server, ServerBuilder};
