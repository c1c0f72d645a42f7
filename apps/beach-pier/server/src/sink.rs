use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use beach_pier_core::Identity;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("session outbound channel closed")]
    Closed,
}

/// Write end through which the server delivers lines to one session.
///
/// Every clone feeds the same bounded queue; a single writer task drains it,
/// so lines from concurrent senders never interleave on the wire.
#[derive(Debug, Clone)]
pub struct SessionSink {
    tx: mpsc::Sender<String>,
}

impl SessionSink {
    /// Creates a sink and the writer task draining it into `transport`.
    ///
    /// The task ends when every sink clone is dropped or when a write fails;
    /// after a failed write the queue is closed and further sends report
    /// [`SinkError::Closed`].
    pub fn spawn<W>(identity: Identity, buffer: usize, transport: W) -> (Self, JoinHandle<()>)
    where
        W: Sink<String> + Unpin + Send + 'static,
        W::Error: std::fmt::Display,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let writer = tokio::spawn(drain(identity, rx, transport));
        (Self { tx }, writer)
    }

    /// Queues one line, waiting for capacity if the peer is slow.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), SinkError> {
        self.tx
            .send(line.into())
            .await
            .map_err(|_| SinkError::Closed)
    }
}

async fn drain<W>(identity: Identity, mut rx: mpsc::Receiver<String>, mut transport: W)
where
    W: Sink<String> + Unpin,
    W::Error: std::fmt::Display,
{
    while let Some(line) = rx.recv().await {
        if let Err(err) = transport.send(line).await {
            warn!(identity = %identity, error = %err, "failed to write to session transport");
            rx.close();
            return;
        }
    }
    if let Err(err) = transport.close().await {
        debug!(identity = %identity, error = %err, "error closing session transport");
    }
    debug!(identity = %identity, "writer task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{channel::mpsc::unbounded, sink, StreamExt};

    #[test_timeout::tokio_timeout_test(10)]
    async fn lines_reach_the_transport_in_order() {
        let (out_tx, mut out_rx) = unbounded::<String>();
        let (sink, writer) = SessionSink::spawn(Identity::generate(), 4, out_tx);

        sink.send("one").await.unwrap();
        sink.clone().send("two").await.unwrap();
        drop(sink);
        writer.await.unwrap();

        assert_eq!(out_rx.next().await.as_deref(), Some("one"));
        assert_eq!(out_rx.next().await.as_deref(), Some("two"));
        assert_eq!(out_rx.next().await, None);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn failed_write_closes_the_queue() {
        let failing = sink::unfold((), |(), _line: String| async move {
            Err::<(), std::io::Error>(std::io::Error::other("broken pipe"))
        });
        let (sink, writer) = SessionSink::spawn(Identity::generate(), 4, Box::pin(failing));

        sink.send("first").await.unwrap();
        writer.await.unwrap();

        assert!(matches!(sink.send("second").await, Err(SinkError::Closed)));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn writer_outlives_a_single_dropped_clone() {
        let (out_tx, mut out_rx) = unbounded::<String>();
        let (sink, writer) = SessionSink::spawn(Identity::generate(), 1, out_tx);

        drop(sink.clone());
        sink.send("still open").await.unwrap();
        assert_eq!(out_rx.next().await.as_deref(), Some("still open"));
        assert!(!writer.is_finished());
    }
}
