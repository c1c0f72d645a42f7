use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Notify;
use tokio_util::task::TaskTracker;
use tracing::info;

use beach_pier_core::reply;

use crate::registry::SessionRegistry;

/// Process-wide shutdown flag. Set at most once; cloning shares the flag.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.flag.swap(true, Ordering::SeqCst);
        if first {
            info!("shutdown requested");
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn triggered(&self) {
        let notified = self.inner.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// Drains running sessions once the accept loop has stopped.
///
/// Sessions are told the server is going away but never force-closed; the
/// drain finishes when every tracked connection task has returned, whether
/// through `/exit` or a dropped connection.
pub struct ShutdownCoordinator {
    registry: SessionRegistry,
    tracker: TaskTracker,
    log_interval: Duration,
}

impl ShutdownCoordinator {
    pub fn new(registry: SessionRegistry, tracker: TaskTracker, log_interval: Duration) -> Self {
        Self {
            registry,
            tracker,
            log_interval,
        }
    }

    pub async fn drain(self) {
        let notified = self
            .registry
            .broadcast(&reply::server(reply::SHUTTING_DOWN))
            .await;
        info!(
            sessions_notified = notified,
            "accept loop stopped; waiting for sessions to finish"
        );

        self.tracker.close();
        let mut ticker = tokio::time::interval(self.log_interval.max(Duration::from_millis(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.tracker.wait() => break,
                _ = ticker.tick() => {
                    info!(
                        sessions_active = self.registry.len(),
                        tasks_pending = self.tracker.len(),
                        "still draining sessions"
                    );
                }
            }
        }
        info!("all sessions drained");
    }
}
