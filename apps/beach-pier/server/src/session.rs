//! Per-connection command loop.
//!
//! A [`SessionHandler`] owns the read side of one client. Lines are read one
//! at a time and either dispatched as commands or relayed to the current
//! target. The display name and target live only here; other sessions see
//! this one exclusively through the [`SessionRegistry`].

use std::net::SocketAddr;

use futures_util::{Stream, StreamExt};
use metrics::counter;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;
use tracing::{debug, info, warn};

use beach_pier_core::{reply, Command, HistoryRecord, Identity, Line};

use crate::{
    history::HistoryStore,
    registry::SessionRegistry,
    sink::{SessionSink, SinkError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no target selected.
    Connected,
    /// Payload lines go to this identity, as long as it is still registered.
    Targeted(Identity),
}

/// Why a session's read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `/exit`.
    Exited,
    /// The transport hit EOF without `/exit`.
    Disconnected,
    /// Reading or writing the client's own transport failed.
    TransportError(String),
}

impl SessionEnd {
    pub fn metric_label(&self) -> &'static str {
        match self {
            SessionEnd::Exited => "exit",
            SessionEnd::Disconnected => "disconnect",
            SessionEnd::TransportError(_) => "transport_error",
        }
    }
}

#[derive(Debug, Error)]
enum SessionError {
    #[error("own outbound channel closed: {0}")]
    OwnSink(#[from] SinkError),
}

enum Flow {
    Continue,
    Exit,
}

pub struct SessionHandler<R> {
    identity: Identity,
    peer: SocketAddr,
    sink: SessionSink,
    registry: SessionRegistry,
    history: HistoryStore,
    reader: R,
    name: String,
    state: SessionState,
}

impl<R> SessionHandler<R>
where
    R: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    pub fn new(
        identity: Identity,
        peer: SocketAddr,
        sink: SessionSink,
        registry: SessionRegistry,
        history: HistoryStore,
        reader: R,
    ) -> Self {
        Self {
            identity,
            peer,
            sink,
            registry,
            history,
            reader,
            name: String::new(),
            state: SessionState::Connected,
        }
    }

    /// Runs the read loop until `/exit`, EOF or a transport error. The
    /// session is always deregistered by the time this returns.
    pub async fn run(mut self) -> SessionEnd {
        let end = loop {
            let line = match self.reader.next().await {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    warn!(
                        identity = %self.identity,
                        peer = %self.peer,
                        error = %err,
                        "error reading from client"
                    );
                    break SessionEnd::TransportError(err.to_string());
                }
                None => {
                    info!(
                        identity = %self.identity,
                        peer = %self.peer,
                        "client disconnected without /exit"
                    );
                    break SessionEnd::Disconnected;
                }
            };

            match self.handle_line(&line).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break SessionEnd::Exited,
                Err(err) => {
                    warn!(identity = %self.identity, error = %err, "dropping session");
                    break SessionEnd::TransportError(err.to_string());
                }
            }
        };

        if end != SessionEnd::Exited {
            self.registry.remove(self.identity);
        }
        end
    }

    async fn handle_line(&mut self, raw: &str) -> Result<Flow, SessionError> {
        match Line::parse(raw) {
            Line::Blank => Ok(Flow::Continue),
            Line::Command(command) => self.dispatch(command).await,
            Line::Payload(text) => {
                self.relay(&text).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, SessionError> {
        debug!(identity = %self.identity, command = command.label(), "dispatching command");
        counter!("beach_pier_commands_total", 1, "command" => command.label());

        match command {
            Command::Username(name) => self.cmd_username(name).await?,
            Command::List => self.cmd_list().await?,
            Command::Target(None) => self.cmd_show_target().await?,
            Command::Target(Some(raw)) => self.cmd_target(&raw).await?,
            Command::History => self.cmd_history().await?,
            Command::Help => self.reply(reply::HELP).await?,
            Command::Exit => return Ok(self.cmd_exit().await),
            Command::Unknown(text) => self.reply(reply::unrecognized(&text)).await?,
        }
        Ok(Flow::Continue)
    }

    async fn cmd_username(&mut self, name: Option<String>) -> Result<(), SessionError> {
        let Some(name) = name else {
            return self.reply(reply::USERNAME_USAGE).await;
        };
        self.registry.set_name(self.identity, name.clone());
        info!(identity = %self.identity, name = %name, "username set");
        self.reply(reply::hello(&name)).await?;
        self.name = name;
        Ok(())
    }

    async fn cmd_list(&mut self) -> Result<(), SessionError> {
        let entries = self.registry.list_all();
        self.reply(reply::client_list(self.identity, &entries)).await
    }

    async fn cmd_show_target(&mut self) -> Result<(), SessionError> {
        match self.target() {
            Some(target) => self.reply(reply::current_target(target)).await,
            None => self.reply(reply::NO_TARGET).await,
        }
    }

    async fn cmd_target(&mut self, raw: &str) -> Result<(), SessionError> {
        let target: Identity = match raw.parse() {
            Ok(target) => target,
            Err(err) => {
                debug!(identity = %self.identity, error = %err, "rejected target");
                return self.reply(reply::invalid_target(raw)).await;
            }
        };

        if target == self.identity {
            return self.reply(reply::CANNOT_TARGET_SELF).await;
        }
        if !self.registry.contains(target) {
            return self.reply(reply::TARGET_NOT_FOUND).await;
        }

        self.state = SessionState::Targeted(target);
        info!(identity = %self.identity, target = %target, "target selected");
        self.reply(reply::connected_to(target)).await
    }

    async fn cmd_history(&mut self) -> Result<(), SessionError> {
        let target = self.target();
        let records = target
            .map(|target| self.history.get(self.identity, target))
            .unwrap_or_default();
        self.reply(reply::history(target, &records)).await
    }

    /// Says goodbye, tells a live target, and deregisters. Failures to reach
    /// either side are ignored: the session ends regardless.
    async fn cmd_exit(&mut self) -> Flow {
        let _ = self.reply(reply::GOODBYE).await;

        if let Some(target) = self.target() {
            if let Some(sink) = self.registry.get_sink(target) {
                let name = self.registry.get_name(self.identity);
                let notice = reply::server(reply::exited(self.identity, name.as_deref()));
                if let Err(err) = sink.send(notice).await {
                    debug!(identity = %self.identity, target = %target, error = %err, "exit notice not delivered");
                }
            }
        }

        self.registry.remove(self.identity);
        info!(identity = %self.identity, peer = %self.peer, "client exited");
        Flow::Exit
    }

    async fn relay(&mut self, text: &str) -> Result<(), SessionError> {
        let Some(target) = self.target() else {
            return self.reply(reply::NO_TARGET).await;
        };

        let Some(sink) = self.registry.get_sink(target) else {
            record_relay_failure("target_absent");
            return self.reply(reply::TARGET_EXITED).await;
        };

        let sender = self.display_name();
        if let Err(err) = sink.send(reply::relayed(&sender, text)).await {
            debug!(identity = %self.identity, target = %target, error = %err, "relay failed");
            record_relay_failure("target_closed");
            return self.reply(reply::TARGET_EXITED).await;
        }

        self.history
            .append(self.identity, target, HistoryRecord::now(sender, text));
        counter!("beach_pier_messages_relayed_total", 1);
        self.reply(reply::sending_to(target)).await
    }

    fn target(&self) -> Option<Identity> {
        match self.state {
            SessionState::Targeted(target) => Some(target),
            SessionState::Connected => None,
        }
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.identity.to_string()
        } else {
            self.name.clone()
        }
    }

    async fn reply(&self, body: impl AsRef<str>) -> Result<(), SessionError> {
        self.sink.send(reply::server(body)).await?;
        Ok(())
    }
}

fn record_relay_failure(reason: &'static str) {
    counter!("beach_pier_relay_failures_total", 1, "reason" => reason);
}
