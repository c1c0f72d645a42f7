use std::{net::SocketAddr, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::info;

use beach_pier_server::{HandshakeMode, ServerConfig, SessionConfig};

mod telemetry;

use telemetry::{Telemetry, TelemetryOptions};

#[derive(Debug, Parser)]
#[command(
    name = "beach-pier-server",
    author,
    version,
    about = "Beach Pier text relay server"
)]
struct Cli {
    /// Address to bind the client listener to.
    #[arg(long, env = "BEACH_PIER_LISTEN_ADDR", default_value = "127.0.0.1:9500")]
    listen_addr: String,

    /// How each client's server-to-client channel is established.
    #[arg(
        long,
        env = "BEACH_PIER_HANDSHAKE_MODE",
        value_enum,
        default_value_t = HandshakeMode::Single
    )]
    handshake_mode: HandshakeMode,

    /// Time a dual-channel client has to connect its outbound stream.
    #[arg(long, env = "BEACH_PIER_HANDSHAKE_TIMEOUT_SECS", default_value_t = 5)]
    handshake_timeout_secs: u64,

    /// How often the accept loop re-checks the shutdown flag.
    #[arg(long, env = "BEACH_PIER_ACCEPT_POLL_MILLIS", default_value_t = 250)]
    accept_poll_millis: u64,

    /// Interval between progress logs while draining sessions.
    #[arg(long, env = "BEACH_PIER_DRAIN_LOG_SECS", default_value_t = 5)]
    drain_log_secs: u64,

    /// Lines queued per session before relaying senders wait.
    #[arg(long, env = "BEACH_PIER_OUTBOUND_BUFFER", default_value_t = 64)]
    outbound_buffer: usize,

    /// Longest accepted line, in bytes.
    #[arg(long, env = "BEACH_PIER_MAX_LINE_LENGTH", default_value_t = 8192)]
    max_line_length: usize,

    /// Accept `shutdown` typed on stdin as a shutdown trigger.
    #[arg(long, env = "BEACH_PIER_STDIN_CONTROL", default_value_t = false)]
    stdin_control: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "BEACH_PIER_METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Mirror tracing spans to stdout through OpenTelemetry.
    #[arg(long, env = "BEACH_PIER_OTEL_STDOUT", default_value_t = false)]
    otel_stdout: bool,
}

impl TryFrom<&Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        ensure!(cli.accept_poll_millis > 0, "accept poll interval must be positive");
        ensure!(cli.max_line_length > 0, "max line length must be positive");

        let defaults = SessionConfig::default();
        Ok(ServerConfig {
            listen_addr,
            handshake_mode: cli.handshake_mode,
            handshake_timeout: Duration::from_secs(cli.handshake_timeout_secs),
            accept_poll_interval: Duration::from_millis(cli.accept_poll_millis),
            drain_log_interval: Duration::from_secs(cli.drain_log_secs.max(1)),
            stdin_control: cli.stdin_control,
            session: SessionConfig {
                outbound_buffer: cli.outbound_buffer.max(1),
                max_line_length: cli.max_line_length,
                ..defaults
            },
        })
    }
}

impl TryFrom<&Cli> for TelemetryOptions {
    type Error = anyhow::Error;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let metrics_addr = cli
            .metrics_addr
            .as_deref()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("invalid metrics address: {addr}"))
            })
            .transpose()?;
        Ok(TelemetryOptions {
            metrics_addr,
            otel_stdout: cli.otel_stdout,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::try_from(&cli)?;
    let _telemetry = Telemetry::init(&TelemetryOptions::try_from(&cli)?)?;

    info!(
        listen_addr = %config.listen_addr,
        handshake_mode = ?config.handshake_mode,
        stdin_control = config.stdin_control,
        "starting beach-pier server"
    );

    beach_pier_server::run(config).await
}
