//! Client-side copy of one room.
//!
//! Sans-IO: local edits mutate the replica and hand back the [`ClientEvent`]
//! to send, remote broadcasts are fed in through [`BoardReplica::apply_remote`].
//! The network client and the tests drive it the same way.
//!
//! Edits made between [`BoardReplica::join`] and the room's first
//! `board:snapshot` are replayed on top of that snapshot, since the server
//! applies them after the snapshot it sent.

use std::collections::HashMap;

use crate::board::Board;
use crate::history::History;
use crate::protocol::{ClientEvent, ConnectionId, JoinRoom, RosterEntry, ServerEvent};
use crate::shape::{Point, Shape};

/// A remote cursor as last reported.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub position: Point,
    pub nickname: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct BoardReplica {
    room_id: String,
    board: Board,
    history: History,
    roster: Vec<RosterEntry>,
    cursors: HashMap<ConnectionId, RemoteCursor>,
    /// Local edits sent since `join`, while the first snapshot is pending.
    unsynced: Option<Vec<ClientEvent>>,
}

impl BoardReplica {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            board: Board::new(),
            history: History::new(),
            roster: Vec::new(),
            cursors: HashMap::new(),
            unsynced: None,
        }
    }

    /// The `join_room` event for this replica's room. Resets local state.
    pub fn join(&mut self, nickname: Option<String>) -> ClientEvent {
        self.board.clear();
        self.history.reset();
        self.roster.clear();
        self.cursors.clear();
        self.unsynced = Some(Vec::new());
        ClientEvent::JoinRoom(JoinRoom::new(self.room_id.clone(), nickname))
    }

    /// Pointer-down: remember the board before the gesture mutates it.
    pub fn begin_gesture(&mut self) {
        self.history.checkpoint(self.board.shapes());
    }

    pub fn create_shape(&mut self, shape: Shape) -> ClientEvent {
        self.board.append(shape.clone());
        self.track(ClientEvent::CreateShape {
            room_id: self.room_id.clone(),
            stroke: shape,
        })
    }

    /// Replace a shape locally; `None` if this replica does not hold the id.
    pub fn update_shape(&mut self, shape: Shape) -> Option<ClientEvent> {
        if !self.board.replace(shape.clone()) {
            return None;
        }
        Some(self.track(ClientEvent::UpdateShape {
            room_id: self.room_id.clone(),
            shape,
        }))
    }

    /// Delete is a complete gesture on its own, so it records its own
    /// checkpoint.
    pub fn delete_shape(&mut self, id: &str) -> Option<ClientEvent> {
        if !self.board.contains(id) {
            return None;
        }
        self.history.checkpoint(self.board.shapes());
        self.board.remove(id);
        Some(self.track(ClientEvent::DeleteShape {
            room_id: self.room_id.clone(),
            shape_id: id.to_string(),
        }))
    }

    pub fn clear_board(&mut self) -> ClientEvent {
        self.board.clear();
        self.history.reset();
        self.track(ClientEvent::ClearBoard {
            room_id: self.room_id.clone(),
        })
    }

    pub fn undo(&mut self) -> Option<ClientEvent> {
        let previous = self.history.undo(self.board.shapes())?;
        Some(self.adopt(previous))
    }

    pub fn redo(&mut self) -> Option<ClientEvent> {
        let next = self.history.redo(self.board.shapes())?;
        Some(self.adopt(next))
    }

    pub fn move_cursor(&self, x: f64, y: f64) -> ClientEvent {
        ClientEvent::MoveCursor {
            room_id: self.room_id.clone(),
            x,
            y,
        }
    }

    /// Apply one event received from the server.
    pub fn apply_remote(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::ShapeCreated(shape) => {
                self.board.append(shape.clone());
            }
            ServerEvent::ShapeUpdated(shape) => {
                if !self.board.replace(shape.clone()) {
                    log::debug!("Ignoring remote update for unknown shape {}", shape.id);
                }
            }
            ServerEvent::ShapeDeleted(id) => {
                if self.board.remove(id).is_none() {
                    log::debug!("Ignoring remote delete for unknown shape {id}");
                }
            }
            ServerEvent::BoardCleared => {
                self.board.clear();
                self.history.reset();
            }
            ServerEvent::BoardSnapshot(shapes) => {
                self.board.replace_all(shapes.clone());
                self.history.reset();
                if let Some(pending) = self.unsynced.take() {
                    if !pending.is_empty() {
                        log::debug!("Replaying {} local edits onto the room snapshot", pending.len());
                    }
                    for event in &pending {
                        self.replay(event);
                    }
                }
            }
            ServerEvent::RoomUsers(roster) => {
                self.cursors
                    .retain(|id, _| roster.iter().any(|entry| entry.connection_id == *id));
                self.roster = roster.clone();
            }
            ServerEvent::CursorMoved(update) => {
                self.cursors.insert(
                    update.connection_id,
                    RemoteCursor {
                        position: Point::new(update.x, update.y),
                        nickname: update.nickname.clone(),
                        color: update.color.clone(),
                    },
                );
            }
            ServerEvent::UserLeft(left) => {
                self.cursors.remove(&left.connection_id);
            }
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn shapes(&self) -> &[Shape] {
        self.board.shapes()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn cursors(&self) -> &HashMap<ConnectionId, RemoteCursor> {
        &self.cursors
    }

    /// True until the first snapshot after `join` has been applied.
    pub fn is_syncing(&self) -> bool {
        self.unsynced.is_some()
    }

    fn adopt(&mut self, shapes: Vec<Shape>) -> ClientEvent {
        self.board.replace_all(shapes.clone());
        self.track(ClientEvent::SnapshotBoard {
            room_id: self.room_id.clone(),
            strokes: shapes,
        })
    }

    fn track(&mut self, event: ClientEvent) -> ClientEvent {
        if let Some(pending) = self.unsynced.as_mut() {
            pending.push(event.clone());
        }
        event
    }

    fn replay(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::CreateShape { stroke, .. } => {
                self.board.append(stroke.clone());
            }
            ClientEvent::UpdateShape { shape, .. } => {
                self.board.replace(shape.clone());
            }
            ClientEvent::DeleteShape { shape_id, .. } => {
                self.board.remove(shape_id);
            }
            ClientEvent::ClearBoard { .. } => {
                self.board.clear();
            }
            ClientEvent::SnapshotBoard { strokes, .. } => {
                self.board.replace_all(strokes.clone());
            }
            ClientEvent::JoinRoom(_) | ClientEvent::MoveCursor { .. } => {}
        }
    }
}
