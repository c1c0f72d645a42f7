//! Programmatic client for the `beach-pier` relay. Used by integration tests
//! and harnesses; it speaks both handshake modes the server offers.

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::debug;

use beach_pier_core::{reply, Identity, DEFAULT_MAX_LINE_LENGTH};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] LinesCodecError),
    #[error("server closed the connection")]
    Closed,
    #[error("timed out waiting for the server")]
    TimedOut,
    #[error("unexpected handshake line: {0}")]
    Handshake(String),
}

/// Which handshake to perform when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectMode {
    #[default]
    Single,
    /// Read a port number from the first stream and connect a second stream
    /// to it for server-to-client traffic.
    DualChannel,
}

pub struct PierClient {
    identity: Identity,
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
    // Dual-channel mode keeps the unused halves open so neither side sees a
    // premature EOF.
    _spare: Option<(OwnedReadHalf, OwnedWriteHalf)>,
}

impl PierClient {
    pub async fn connect(addr: SocketAddr, mode: ConnectMode) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let codec = || LinesCodec::new_with_max_length(DEFAULT_MAX_LINE_LENGTH);

        let (mut reader, writer, spare) = match mode {
            ConnectMode::Single => {
                let (read, write) = stream.into_split();
                (FramedRead::new(read, codec()), FramedWrite::new(write, codec()), None)
            }
            ConnectMode::DualChannel => {
                let (inbound_read, inbound_write) = stream.into_split();
                let mut inbound_lines = FramedRead::new(inbound_read, codec());
                let port_line = next_with_timeout(&mut inbound_lines, DEFAULT_READ_TIMEOUT).await?;
                let port: u16 = port_line
                    .trim()
                    .parse()
                    .map_err(|_| ClientError::Handshake(port_line.clone()))?;
                debug!(port, "connecting outbound channel");

                let outbound = TcpStream::connect((addr.ip(), port)).await?;
                let (outbound_read, outbound_write) = outbound.into_split();
                (
                    FramedRead::new(outbound_read, codec()),
                    FramedWrite::new(inbound_write, codec()),
                    Some((inbound_lines.into_inner(), outbound_write)),
                )
            }
        };

        let greeting = next_with_timeout(&mut reader, DEFAULT_READ_TIMEOUT).await?;
        let identity = reply::parse_identity_line(&greeting)
            .ok_or_else(|| ClientError::Handshake(greeting.clone()))?;

        Ok(Self {
            identity,
            reader,
            writer,
            _spare: spare,
        })
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub async fn send(&mut self, line: impl AsRef<str>) -> Result<(), ClientError> {
        self.writer.send(line.as_ref()).await?;
        Ok(())
    }

    /// Next line from the server; [`ClientError::Closed`] on EOF.
    pub async fn next_line(&mut self) -> Result<String, ClientError> {
        next_with_timeout(&mut self.reader, DEFAULT_READ_TIMEOUT).await
    }

    /// Reads lines until one contains `needle`, returning every line read.
    pub async fn read_until(&mut self, needle: &str) -> Result<Vec<String>, ClientError> {
        let mut seen = Vec::new();
        loop {
            let line = self.next_line().await?;
            let done = line.contains(needle);
            seen.push(line);
            if done {
                return Ok(seen);
            }
        }
    }

    /// Sends a command and collects its reply, stopping at `needle`.
    pub async fn request(
        &mut self,
        line: impl AsRef<str>,
        needle: &str,
    ) -> Result<Vec<String>, ClientError> {
        self.send(line).await?;
        self.read_until(needle).await
    }

    /// Waits for the server to close our read path, discarding lines.
    pub async fn wait_closed(&mut self) -> Result<(), ClientError> {
        loop {
            match self.next_line().await {
                Ok(_) => continue,
                Err(ClientError::Closed) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}

async fn next_with_timeout(
    reader: &mut FramedRead<OwnedReadHalf, LinesCodec>,
    limit: Duration,
) -> Result<String, ClientError> {
    match timeout(limit, reader.next()).await {
        Err(_) => Err(ClientError::TimedOut),
        Ok(None) => Err(ClientError::Closed),
        Ok(Some(line)) => Ok(line?),
    }
}
