#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use tokio::{net::TcpListener, task::JoinHandle};

use beach_pier_server::{
    HandshakeMode, HistoryStore, PierServer, ServerConfig, SessionRegistry, ShutdownHandle,
};

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: SessionRegistry,
    pub history: HistoryStore,
    pub shutdown: ShutdownHandle,
    pub task: JoinHandle<()>,
}

pub fn test_config(mode: HandshakeMode) -> ServerConfig {
    ServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        handshake_mode: mode,
        handshake_timeout: Duration::from_secs(2),
        accept_poll_interval: Duration::from_millis(20),
        drain_log_interval: Duration::from_millis(100),
        ..ServerConfig::default()
    }
}

pub async fn start(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    let server = PierServer::new(config);
    let registry = server.registry().clone();
    let history = server.history().clone();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.serve(listener));
    TestServer {
        addr,
        registry,
        history,
        shutdown,
        task,
    }
}

/// Polls `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
