//! Per-connection lifecycle and the single event loop that drives it.
//!
//! Every inbound event, from every connection, goes through one mpsc
//! channel into one task. That task owns the session directory and the
//! fan-out table outright, so nothing here needs a lock. Store calls are
//! awaited inline: an event is handled to completion, broadcasts included,
//! before the next one is picked up. This keeps each sender's messages in
//! program order and makes "persisted first" equal "broadcast first".

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use huddle_db::MessageStore;
use huddle_types::events::{ClientCommand, ServerEvent};
use huddle_types::models::{ConnectionId, Identity, Participant};

use crate::config::GatewayConfig;
use crate::directory::{Announce, SessionDirectory};
use crate::dispatcher::{Dispatcher, Outbound, Outbox};
use crate::error::{GatewayError, ValidationError};
use crate::presence;
use crate::router::MessageRouter;

/// Everything the supervisor reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connect { identity: Option<Identity> },
    Command(ClientCommand),
    Disconnect,
}

enum Envelope {
    Connect {
        conn: ConnectionId,
        identity: Option<Identity>,
        outbox: Outbox,
    },
    Command {
        conn: ConnectionId,
        command: ClientCommand,
    },
    Disconnect {
        conn: ConnectionId,
    },
}

/// Cloneable handle used by connection tasks to reach the supervisor.
#[derive(Clone)]
pub struct Gateway {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Gateway {
    /// Start the supervisor task.
    pub fn spawn(store: Arc<dyn MessageStore>, config: GatewayConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(store, config);
        let handle = tokio::spawn(supervisor.run(rx));
        (Self { tx }, handle)
    }

    /// Register a new connection. Its history arrives on the returned
    /// receiver before any broadcast.
    pub fn connect(
        &self,
        identity: Option<Identity>,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Arc<ServerEvent>>) {
        let conn = ConnectionId::new();
        let (outbox, rx) = mpsc::unbounded_channel();
        self.send(Envelope::Connect {
            conn,
            identity,
            outbox,
        });
        (conn, rx)
    }

    pub fn submit(&self, conn: ConnectionId, command: ClientCommand) {
        self.send(Envelope::Command { conn, command });
    }

    pub fn disconnect(&self, conn: ConnectionId) {
        self.send(Envelope::Disconnect { conn });
    }

    fn send(&self, envelope: Envelope) {
        if self.tx.send(envelope).is_err() {
            warn!("Gateway supervisor is gone, dropping event");
        }
    }
}

/// Owns the session directory, the message router and the fan-out table.
pub struct Supervisor {
    directory: SessionDirectory,
    router: MessageRouter,
    dispatcher: Dispatcher,
    store: Arc<dyn MessageStore>,
    history_window: usize,
}

impl Supervisor {
    pub fn new(store: Arc<dyn MessageStore>, config: GatewayConfig) -> Self {
        Self {
            directory: SessionDirectory::new(),
            router: MessageRouter::new(store.clone(), config.clear_policy),
            dispatcher: Dispatcher::new(),
            store,
            history_window: config.history_window,
        }
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        info!("Gateway supervisor started (history window {})", self.history_window);

        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Connect {
                    conn,
                    identity,
                    outbox,
                } => {
                    self.dispatcher.register(conn, outbox);
                    let out = self.handle(conn, Inbound::Connect { identity }).await;
                    self.dispatcher.deliver(out);
                }
                Envelope::Command { conn, command } => {
                    let out = self.handle(conn, Inbound::Command(command)).await;
                    self.dispatcher.deliver(out);
                }
                Envelope::Disconnect { conn } => {
                    let out = self.handle(conn, Inbound::Disconnect).await;
                    self.dispatcher.unregister(conn);
                    self.dispatcher.deliver(out);
                    debug!("{} outboxes still open", self.dispatcher.connected());
                }
            }
        }

        info!("Gateway supervisor stopped");
    }

    /// Handle one event and return what must be delivered, in order.
    pub async fn handle(&mut self, conn: ConnectionId, inbound: Inbound) -> Vec<Outbound> {
        match inbound {
            Inbound::Connect { identity } => self.on_connect(conn, identity).await,
            Inbound::Disconnect => self.on_disconnect(conn),
            Inbound::Command(command) => {
                let name = command.name();
                match self.on_command(conn, command).await {
                    Ok(out) => out,
                    Err(e) => {
                        warn!("{} {} rejected: {}", conn, name, e);
                        vec![Outbound::only(conn, e.to_event())]
                    }
                }
            }
        }
    }

    async fn on_connect(&mut self, conn: ConnectionId, identity: Option<Identity>) -> Vec<Outbound> {
        if !self.directory.open(conn, identity) {
            warn!("{} connected twice, history not resent", conn);
            return vec![];
        }

        let history = match self.store.find_recent(self.history_window).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("History unavailable for {}, continuing without it: {}", conn, e);
                vec![]
            }
        };

        info!(
            "{} joined ({} online, {} announced, {} history messages)",
            conn,
            self.directory.len(),
            self.directory.announced(),
            history.len()
        );
        vec![Outbound::only(conn, ServerEvent::ChatHistory(history))]
    }

    fn on_announce(
        &mut self,
        conn: ConnectionId,
        display_name: String,
        avatar_ref: Option<String>,
    ) -> Result<Vec<Outbound>, GatewayError> {
        let display_name = display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(ValidationError::MissingField("display_name").into());
        }

        let participant = Participant {
            display_name,
            avatar_ref: avatar_ref.filter(|a| !a.trim().is_empty()),
        };
        let name = participant.display_name.clone();

        match self.directory.announce(conn, participant) {
            Some(Announce::First) => info!("{} announced as {}", conn, name),
            Some(Announce::Replaced) => debug!("{} re-announced as {}", conn, name),
            None => {
                warn!("Announce from {} without a live session, ignored", conn);
                return Ok(vec![]);
            }
        }

        Ok(vec![presence::publish_roster(&self.directory)])
    }

    fn on_typing(&mut self, conn: ConnectionId, typing: bool) -> Vec<Outbound> {
        let Some(name) = self.directory.set_typing(conn, typing) else {
            debug!("Typing from unannounced connection {}, ignored", conn);
            return vec![];
        };

        if typing {
            vec![presence::publish_typing_start(conn, name)]
        } else {
            vec![presence::publish_typing_stop(conn, name)]
        }
    }

    fn on_disconnect(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let Some(session) = self.directory.close(conn) else {
            warn!("Disconnect for unknown connection {}", conn);
            return vec![];
        };

        let Some(participant) = session.participant else {
            debug!("{} left without announcing", conn);
            return vec![];
        };

        info!(
            "{} ({}) left{}",
            conn,
            participant.display_name,
            if session.typing { " while typing" } else { "" }
        );

        // A typing start with no stop must not outlive the connection
        vec![
            presence::publish_typing_stop(conn, participant.display_name),
            presence::publish_roster(&self.directory),
        ]
    }

    async fn on_command(
        &mut self,
        conn: ConnectionId,
        command: ClientCommand,
    ) -> Result<Vec<Outbound>, GatewayError> {
        match command {
            ClientCommand::UserConnected {
                display_name,
                avatar_ref,
            } => self.on_announce(conn, display_name, avatar_ref),

            ClientCommand::ChatMessage(draft) => {
                let session = self.directory.get(conn);
                self.router.on_message(conn, session, draft).await
            }

            ClientCommand::MessageSeen { message_id } => self.router.on_seen(conn, message_id).await,

            ClientCommand::TypingStart => Ok(self.on_typing(conn, true)),

            ClientCommand::TypingStop => Ok(self.on_typing(conn, false)),

            ClientCommand::ClearChat => {
                let session = self.directory.get(conn);
                self.router.on_clear(conn, session).await
            }

            ClientCommand::SendAlert { sender, text } => {
                let session = self.directory.get(conn);
                self.router.on_alert(session, sender, text)
            }
        }
    }
}
