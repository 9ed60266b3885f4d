//! Dedicated writer task - one writer per connection.
//!
//! Outbound frames go through an mpsc channel consumed by a single task that
//! owns the write half, so concurrent callers (client) or response producers
//! (server) can never interleave partial frames on the wire.
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! Caller N ─┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, WirecallError};
use crate::protocol::{Header, HEADER_SIZE};

/// Channel capacity for the outbound frame queue.
const CHANNEL_CAPACITY: usize = 256;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    /// Pre-encoded header (16 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Body bytes (may be empty).
    pub body: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    pub fn new(header: &Header, body: Bytes) -> Self {
        Self {
            header: header.encode(),
            body,
        }
    }
}

/// Handle for sending frames to the writer task. Cheaply cloneable.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Fails with `ConnectionClosed` once the writer task has exited.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| WirecallError::ConnectionClosed)
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task exits cleanly when every handle is dropped, or with an error when
/// the socket write fails.
pub(crate) fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes header then body.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer.write_all(&frame.header).await?;
        if !frame.body.is_empty() {
            writer.write_all(&frame.body).await?;
        }
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_writer_sends_header_and_body() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client);

        let header = Header::request(42, 5);
        handle
            .send(OutboundFrame::new(&header, Bytes::from_static(b"hello")))
            .await
            .unwrap();

        let mut buf = vec![0u8; HEADER_SIZE + 5];
        server.read_exact(&mut buf).await.unwrap();

        let parsed = Header::decode(&buf[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&buf[HEADER_SIZE..], b"hello");
    }

    #[tokio::test]
    async fn test_writer_serializes_concurrent_senders() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task) = spawn_writer_task(client);

        let mut tasks = Vec::new();
        for id in 1..=20u32 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let body = Bytes::from(vec![id as u8; 32]);
                let header = Header::request(id, 32);
                handle.send(OutboundFrame::new(&header, body)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Every frame must come out intact; whole-frame boundaries prove no
        // interleaving happened.
        let total = 20 * (HEADER_SIZE + 32);
        let mut buf = vec![0u8; total];
        server.read_exact(&mut buf).await.unwrap();

        let mut seen = Vec::new();
        for chunk in buf.chunks(HEADER_SIZE + 32) {
            let header = Header::decode(&chunk[..HEADER_SIZE]).unwrap();
            assert!(chunk[HEADER_SIZE..]
                .iter()
                .all(|&b| b == header.correlation_id as u8));
            seen.push(header.correlation_id);
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_handle_drop() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client);

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
