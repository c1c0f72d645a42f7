use std::{net::SocketAddr, time::Duration};

use beach_pier_core::DEFAULT_MAX_LINE_LENGTH;

const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// How a client's outbound channel is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HandshakeMode {
    /// One bidirectional stream per client.
    #[default]
    Single,
    /// Legacy protocol: the server opens a second, per-client listener and
    /// sends its port on the inbound stream; the client connects back to it
    /// for server-to-client traffic.
    DualChannel,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub handshake_mode: HandshakeMode,
    pub handshake_timeout: Duration,
    /// Upper bound on how long the accept loop blocks before re-checking the
    /// shutdown flag.
    pub accept_poll_interval: Duration,
    pub drain_log_interval: Duration,
    pub stdin_control: bool,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9500)),
            handshake_mode: HandshakeMode::default(),
            handshake_timeout: Duration::from_secs(5),
            accept_poll_interval: Duration::from_millis(250),
            drain_log_interval: Duration::from_secs(5),
            stdin_control: false,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub outbound_buffer: usize,
    pub max_line_length: usize,
    /// How long a finished session waits for queued lines to be written.
    pub flush_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            flush_timeout: Duration::from_secs(5),
        }
    }
}
