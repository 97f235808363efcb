use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use huddle_types::events::ServerEvent;
use huddle_types::models::ConnectionId;

/// Per-connection queue of events waiting to be written to the socket.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Which connections an event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    AllExcept(ConnectionId),
    Only(ConnectionId),
}

impl Target {
    pub fn includes(&self, conn: ConnectionId) -> bool {
        match *self {
            Self::All => true,
            Self::AllExcept(excluded) => conn != excluded,
            Self::Only(target) => conn == target,
        }
    }
}

/// One event plus its audience. Handlers return these instead of sending,
/// so the broadcast set of every command can be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn all(event: ServerEvent) -> Self {
        Self {
            target: Target::All,
            event,
        }
    }

    pub fn all_except(conn: ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::AllExcept(conn),
            event,
        }
    }

    pub fn only(conn: ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::Only(conn),
            event,
        }
    }
}

/// Fan-out over the outboxes of all connected clients.
#[derive(Default)]
pub struct Dispatcher {
    outboxes: HashMap<ConnectionId, Outbox>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(conn, outbox);
    }

    pub fn unregister(&mut self, conn: ConnectionId) {
        self.outboxes.remove(&conn);
    }

    pub fn connected(&self) -> usize {
        self.outboxes.len()
    }

    /// Deliver events in order. A closed outbox means the client is gone;
    /// its events are dropped.
    pub fn deliver(&self, outbound: Vec<Outbound>) {
        for Outbound { target, event } in outbound {
            let event = Arc::new(event);
            let mut delivered = 0usize;

            for (&conn, outbox) in &self.outboxes {
                if !target.includes(conn) {
                    continue;
                }
                if outbox.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    trace!("Outbox for {} closed, dropping {}", conn, event.name());
                }
            }

            debug!("{} -> {} connection(s)", event.name(), delivered);
        }
    }
}
