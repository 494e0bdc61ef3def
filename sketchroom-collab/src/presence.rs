//! Presence registry: who is connected, which room they joined, how they
//! are displayed, and where their cursor last was.
//!
//! ## Lifecycle
//!
//! ```text
//! connect ──► Session { room: None }
//!                │ join(room, nickname)       color picked on first join
//!                ▼
//!             Session { room: Some(r) } ──► roster(r), members(r)
//!                │ disconnect
//!                ▼
//!             removed
//! ```
//!
//! The registry is an ordinary value owned by the session gateway; there is
//! no process-global map. Cursor positions are ephemeral and never persisted.

use std::collections::HashMap;

use sketchroom_core::protocol::{ConnectionId, CursorUpdate, RosterEntry};
use sketchroom_core::shape::Point;
use uuid::Uuid;

/// Nickname used when a client joins without one.
pub const DEFAULT_NICKNAME: &str = "Anonymous";

/// Fixed cursor palette. Two users in one room may share a color.
pub const PALETTE: [&str; 8] = [
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#06b6d4", "#3b82f6", "#8b5cf6", "#ec4899",
];

/// Uniform random pick from [`PALETTE`], drawn from the random bits of a v4
/// UUID.
pub fn pick_color() -> &'static str {
    let idx = Uuid::new_v4().as_u128() % PALETTE.len() as u128;
    PALETTE[idx as usize]
}

// ───────────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────────

/// Metadata for one live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub connection_id: ConnectionId,
    /// `None` until the first successful join.
    pub room_id: Option<String>,
    pub nickname: String,
    /// Picked on first join, then stable for the connection's lifetime.
    pub color: Option<String>,
    /// Last reported cursor position in the current room.
    pub cursor: Option<Point>,
    /// Join order within the registry, used to keep rosters stable.
    joined_seq: u64,
}

impl Session {
    fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            room_id: None,
            nickname: DEFAULT_NICKNAME.to_string(),
            color: None,
            cursor: None,
            joined_seq: 0,
        }
    }

    pub fn is_in(&self, room_id: &str) -> bool {
        self.room_id.as_deref() == Some(room_id)
    }

    fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            connection_id: self.connection_id,
            nickname: self.nickname.clone(),
            color: self.color.clone().unwrap_or_default(),
        }
    }
}

/// Result of binding a session to a room.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// Room the session was in before, if it differs from the new one.
    pub previous_room: Option<String>,
    pub color: String,
}

// ───────────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: HashMap<ConnectionId, Session>,
    next_seq: u64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, unjoined connection.
    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.sessions
            .entry(connection_id)
            .or_insert_with(|| Session::new(connection_id));
    }

    /// Bind a session to `room_id`.
    ///
    /// Returns `None` if the connection is unknown. A session that was in
    /// another room leaves it; the old room is reported back so its peers can
    /// be told.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room_id: &str,
        nickname: Option<String>,
    ) -> Option<JoinOutcome> {
        let seq = self.next_seq;
        let session = self.sessions.get_mut(&connection_id)?;

        let previous_room = session
            .room_id
            .replace(room_id.to_string())
            .filter(|previous| previous != room_id);

        if let Some(name) = nickname.filter(|n| !n.trim().is_empty()) {
            session.nickname = name;
        }
        let color = session
            .color
            .get_or_insert_with(|| pick_color().to_string())
            .clone();

        if previous_room.is_some() || session.joined_seq == 0 {
            session.cursor = None;
            session.joined_seq = seq + 1;
            self.next_seq += 1;
        }

        Some(JoinOutcome { previous_room, color })
    }

    /// Remove a session. Returns it so the caller can notify its room.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        self.sessions.remove(connection_id)
    }

    pub fn session(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.sessions
            .get(connection_id)
            .and_then(|s| s.room_id.as_deref())
    }

    pub fn is_member(&self, connection_id: &ConnectionId, room_id: &str) -> bool {
        self.sessions
            .get(connection_id)
            .is_some_and(|s| s.is_in(room_id))
    }

    /// Everyone in `room_id`, in join order.
    pub fn roster(&self, room_id: &str) -> Vec<RosterEntry> {
        self.sorted_members(room_id)
            .into_iter()
            .map(Session::roster_entry)
            .collect()
    }

    /// Connection ids in `room_id`, in join order.
    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.sorted_members(room_id)
            .into_iter()
            .map(|s| s.connection_id)
            .collect()
    }

    /// Record a cursor position and build the update peers should see.
    ///
    /// `None` if the session is unknown or not joined.
    pub fn move_cursor(&mut self, connection_id: &ConnectionId, x: f64, y: f64) -> Option<CursorUpdate> {
        let session = self.sessions.get_mut(connection_id)?;
        session.room_id.as_ref()?;
        session.cursor = Some(Point::new(x, y));
        Some(CursorUpdate {
            connection_id: *connection_id,
            x,
            y,
            nickname: session.nickname.clone(),
            color: session.color.clone().unwrap_or_default(),
        })
    }

    /// Number of live connections, joined or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn sorted_members(&self, room_id: &str) -> Vec<&Session> {
        let mut members: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| s.is_in(room_id))
            .collect();
        members.sort_by_key(|s| s.joined_seq);
        members
    }
}

// ===================================================================
// Tests
// ===================================================================
