//! Session management and relay core of the Beach Pier text relay.
//!
//! Clients connect over TCP, receive an identity, pick a peer with
//! `/target <id>` and exchange newline-framed text routed through here.
//! [`PierServer::serve`] takes an already-bound listener; [`run`] binds one
//! from [`ServerConfig`] and wires up the shutdown triggers.

pub mod acceptor;
pub mod config;
pub mod history;
pub mod registry;
pub mod session;
pub mod shutdown;
pub mod sink;

use std::{io::BufRead, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

pub use config::{HandshakeMode, ServerConfig, SessionConfig};
pub use history::HistoryStore;
pub use registry::{RegistryError, SessionRegistry};
pub use shutdown::{ShutdownCoordinator, ShutdownHandle};
pub use sink::{SessionSink, SinkError};

use acceptor::Acceptor;

pub struct PierServer {
    config: Arc<ServerConfig>,
    registry: SessionRegistry,
    history: HistoryStore,
    shutdown: ShutdownHandle,
}

impl PierServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            history: HistoryStore::new(),
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves `listener` until shutdown is triggered and every session has
    /// finished. The listener is closed only after the drain completes.
    pub async fn serve(self, listener: TcpListener) {
        let tracker = TaskTracker::new();
        let acceptor = Acceptor::new(
            listener,
            Arc::clone(&self.config),
            self.registry.clone(),
            self.history.clone(),
            self.shutdown.clone(),
            tracker.clone(),
        );
        let listener = acceptor.run().await;

        ShutdownCoordinator::new(
            self.registry.clone(),
            tracker,
            self.config.drain_log_interval,
        )
        .drain()
        .await;

        drop(listener);
        info!(
            conversations = self.history.conversation_count(),
            "listener closed"
        );
    }
}

/// Binds the configured address and serves until Ctrl-C (or `shutdown` on
/// stdin when enabled) and the subsequent drain.
pub async fn run(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        listen_addr = %local_addr,
        handshake_mode = ?config.handshake_mode,
        "beach-pier listening"
    );

    let stdin_control = config.stdin_control;
    let server = PierServer::new(config);
    let handle = server.shutdown_handle();

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received");
                    handle.trigger();
                }
                Err(err) => warn!(error = %err, "failed to listen for ctrl-c"),
            }
        });
    }
    if stdin_control {
        spawn_stdin_listener(handle);
    }

    server.serve(listener).await;
    info!("shutdown complete");
    Ok(())
}

/// Watches stdin on a plain thread so a blocked read never holds up runtime
/// teardown.
fn spawn_stdin_listener(handle: ShutdownHandle) {
    let spawned = std::thread::Builder::new()
        .name("pier-stdin".into())
        .spawn(move || watch_console(std::io::stdin().lock(), &handle));
    if let Err(err) = spawned {
        warn!(error = %err, "failed to start stdin listener");
    }
}

/// Reads console commands until `shutdown`/`quit` (which trigger `handle`),
/// EOF, or a read error. Returns whether shutdown was triggered.
fn watch_console(input: impl BufRead, handle: &ShutdownHandle) -> bool {
    for line in input.lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "shutdown" | "quit" => {
                handle.trigger();
                return true;
            }
            "" => {}
            other => warn!(input = other, "unknown console command; try 'shutdown'"),
        }
    }
    false
}
