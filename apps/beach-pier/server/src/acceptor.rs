use std::{net::SocketAddr, sync::Arc};

use metrics::counter;
use thiserror::Error;
use tokio::{
    io::AsyncWriteExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time::timeout,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LinesCodec},
    task::TaskTracker,
};
use tracing::{debug, error, info, warn};

use beach_pier_core::{reply, Identity};

use crate::{
    config::{HandshakeMode, ServerConfig},
    history::HistoryStore,
    registry::SessionRegistry,
    session::SessionHandler,
    shutdown::ShutdownHandle,
    sink::SessionSink,
};

pub type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;
pub type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake timed out waiting for the outbound connection")]
    TimedOut,
    #[error("i/o error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    fn metric_label(&self) -> &'static str {
        match self {
            HandshakeError::TimedOut => "timeout",
            HandshakeError::Io(_) => "io",
        }
    }
}

/// Read and write paths of one client, after the handshake.
pub struct SessionTransport {
    pub reader: LineReader,
    pub writer: LineWriter,
}

/// Accept loop. Each accepted connection gets its own tracked task that
/// performs the handshake and then runs the session to completion.
pub struct Acceptor {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    registry: SessionRegistry,
    history: HistoryStore,
    shutdown: ShutdownHandle,
    tracker: TaskTracker,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        config: Arc<ServerConfig>,
        registry: SessionRegistry,
        history: HistoryStore,
        shutdown: ShutdownHandle,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            listener,
            config,
            registry,
            history,
            shutdown,
            tracker,
        }
    }

    /// Accepts until the shutdown flag is observed, then hands the listener
    /// back so the caller can keep it open until sessions have drained.
    pub async fn run(self) -> TcpListener {
        let poll = self.config.accept_poll_interval;
        loop {
            if self.shutdown.is_triggered() {
                info!("shutdown flag set; no longer accepting connections");
                break;
            }

            let accepted = tokio::select! {
                _ = self.shutdown.triggered() => continue,
                accepted = timeout(poll, self.listener.accept()) => accepted,
            };
            let (stream, peer) = match accepted {
                Err(_elapsed) => continue,
                Ok(Ok(accepted)) => accepted,
                Ok(Err(err)) => {
                    // Errors like EMFILE persist; wait out a poll interval before retrying.
                    warn!(error = %err, "failed to accept connection");
                    tokio::time::sleep(poll).await;
                    continue;
                }
            };

            info!(peer = %peer, "new connection");
            let config = Arc::clone(&self.config);
            let registry = self.registry.clone();
            let history = self.history.clone();
            let shutdown = self.shutdown.clone();
            self.tracker.spawn(async move {
                handle_connection(stream, peer, config, registry, history, shutdown).await;
                debug!(peer = %peer, "connection task finished");
            });
        }
        self.listener
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    registry: SessionRegistry,
    history: HistoryStore,
    shutdown: ShutdownHandle,
) {
    let transport = match establish(stream, &config).await {
        Ok(transport) => transport,
        Err(err) => {
            counter!(
                "beach_pier_handshakes_failure_total",
                1,
                "reason" => err.metric_label()
            );
            warn!(peer = %peer, error = %err, "handshake failed");
            return;
        }
    };

    let identity = Identity::generate();
    let (sink, mut writer) =
        SessionSink::spawn(identity, config.session.outbound_buffer, transport.writer);

    if !register(identity, peer, &sink, &registry, &shutdown).await {
        return;
    }

    let handler = SessionHandler::new(
        identity,
        peer,
        sink,
        registry,
        history,
        transport.reader,
    );
    let end = handler.run().await;
    counter!(
        "beach_pier_connections_closed_total",
        1,
        "reason" => end.metric_label()
    );

    // The handler's sink is gone; the writer exits once queued lines are out.
    if timeout(config.session.flush_timeout, &mut writer).await.is_err() {
        warn!(identity = %identity, "timed out flushing session output");
        writer.abort();
    }
    info!(identity = %identity, peer = %peer, reason = end.metric_label(), "session closed");
}

/// Greets a new session and makes it visible to other sessions.
///
/// The greeting is queued before the registry entry exists, so it is always
/// the first line the client reads. A session registered after the drain
/// broadcast gets the shutdown notice here instead.
async fn register(
    identity: Identity,
    peer: SocketAddr,
    sink: &SessionSink,
    registry: &SessionRegistry,
    shutdown: &ShutdownHandle,
) -> bool {
    if sink.send(reply::server(reply::your_identity(identity))).await.is_err() {
        warn!(identity = %identity, peer = %peer, "client went away before greeting");
        return false;
    }
    if registry.add(identity, sink.clone()).is_err() {
        error!(identity = %identity, peer = %peer, "identity collision; dropping connection");
        return false;
    }
    counter!("beach_pier_connections_total", 1);
    info!(identity = %identity, peer = %peer, "session established");

    if shutdown.is_triggered() {
        let _ = sink.send(reply::server(reply::SHUTTING_DOWN)).await;
    }
    true
}

/// Sets up the read and write paths for a freshly accepted connection.
pub async fn establish(
    stream: TcpStream,
    config: &ServerConfig,
) -> Result<SessionTransport, HandshakeError> {
    let max_line = config.session.max_line_length;
    match config.handshake_mode {
        HandshakeMode::Single => {
            let (read, write) = stream.into_split();
            Ok(SessionTransport {
                reader: FramedRead::new(read, LinesCodec::new_with_max_length(max_line)),
                writer: FramedWrite::new(write, LinesCodec::new_with_max_length(max_line)),
            })
        }
        HandshakeMode::DualChannel => {
            let local_ip = stream.local_addr()?.ip();
            let side = TcpListener::bind((local_ip, 0)).await?;
            let port = side.local_addr()?.port();

            let (read, mut write) = stream.into_split();
            write.write_all(format!("{port}\n").as_bytes()).await?;
            write.flush().await?;
            debug!(port, "waiting for outbound connection");

            let (outbound, outbound_peer) = timeout(config.handshake_timeout, side.accept())
                .await
                .map_err(|_| HandshakeError::TimedOut)??;
            debug!(peer = %outbound_peer, "outbound connection established");

            let (_unused_read, outbound_write) = outbound.into_split();
            Ok(SessionTransport {
                reader: FramedRead::new(read, LinesCodec::new_with_max_length(max_line)),
                writer: FramedWrite::new(
                    outbound_write,
                    LinesCodec::new_with_max_length(max_line),
                ),
            })
        }
    }
}
