use std::collections::HashMap;

use huddle_types::models::{ConnectionId, Identity, Participant};

/// Presence state of one live connection.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Authenticated identity from the credential layer, if any.
    pub identity: Option<Identity>,
    /// Set by the first announce; later announces overwrite it.
    pub participant: Option<Participant>,
    /// Last typing transition reported by this connection.
    pub typing: bool,
    /// Order of first announce, used to keep the roster stable.
    pub(crate) announce_seq: Option<u64>,
}

impl Session {
    pub fn is_announced(&self) -> bool {
        self.participant.is_some()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.participant.as_ref().map(|p| p.display_name.as_str())
    }
}

/// Announce outcome, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    First,
    Replaced,
}

/// Live connections and their presence metadata. Owned by the supervisor
/// and only mutated from its event loop.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: HashMap<ConnectionId, Session>,
    next_seq: u64,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session. Returns false if the connection is
    /// already known.
    pub fn open(&mut self, conn: ConnectionId, identity: Option<Identity>) -> bool {
        if self.sessions.contains_key(&conn) {
            return false;
        }
        self.sessions.insert(
            conn,
            Session {
                identity,
                ..Session::default()
            },
        );
        true
    }

    /// Populate a session. `None` if the connection has no session.
    pub fn announce(&mut self, conn: ConnectionId, participant: Participant) -> Option<Announce> {
        let session = self.sessions.get_mut(&conn)?;
        let outcome = if session.announce_seq.is_none() {
            session.announce_seq = Some(self.next_seq);
            self.next_seq += 1;
            Announce::First
        } else {
            Announce::Replaced
        };
        session.participant = Some(participant);
        Some(outcome)
    }

    /// Record a typing transition. Returns the display name of an announced
    /// session, `None` otherwise.
    pub fn set_typing(&mut self, conn: ConnectionId, typing: bool) -> Option<String> {
        let session = self.sessions.get_mut(&conn)?;
        let name = session.display_name()?.to_string();
        session.typing = typing;
        Some(name)
    }

    pub fn close(&mut self, conn: ConnectionId) -> Option<Session> {
        self.sessions.remove(&conn)
    }

    pub fn get(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    /// Announced participants in first-announce order.
    pub fn roster(&self) -> Vec<Participant> {
        let mut announced: Vec<(u64, &Participant)> = self
            .sessions
            .values()
            .filter_map(|s| Some((s.announce_seq?, s.participant.as_ref()?)))
            .collect();
        announced.sort_by_key(|(seq, _)| *seq);
        announced.into_iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions that have announced a display name.
    pub fn announced(&self) -> usize {
        self.sessions.values().filter(|s| s.is_announced()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
