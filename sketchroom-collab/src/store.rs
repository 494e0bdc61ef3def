//! Authoritative in-memory shape store: room id → ordered [`Board`].
//!
//! Only the session gateway's event loop touches the store, so it needs no
//! locking. Each mutation reports whether it changed anything so the caller
//! can decide what to broadcast and persist.

use std::collections::HashMap;

use sketchroom_core::board::{Board, Placement};
use sketchroom_core::shape::Shape;

#[derive(Debug, Default)]
pub struct ShapeStore {
    rooms: HashMap<String, Board>,
}

impl ShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Install a room, typically right after it was loaded from storage.
    /// An already present room is left untouched.
    pub fn insert_room(&mut self, room_id: &str, shapes: Vec<Shape>) -> bool {
        if self.rooms.contains_key(room_id) {
            return false;
        }
        self.rooms.insert(room_id.to_string(), Board::from_shapes(shapes));
        true
    }

    /// Current ordered snapshot of a room.
    pub fn snapshot(&self, room_id: &str) -> Option<Vec<Shape>> {
        self.rooms.get(room_id).map(Board::to_vec)
    }

    /// Append a shape (duplicate id: last value wins in place).
    pub fn create(&mut self, room_id: &str, shape: Shape) -> Option<Placement> {
        self.rooms.get_mut(room_id).map(|board| board.append(shape))
    }

    /// In-place replace. `false` if the room or the id is unknown.
    pub fn update(&mut self, room_id: &str, shape: Shape) -> bool {
        self.rooms
            .get_mut(room_id)
            .is_some_and(|board| board.replace(shape))
    }

    /// Remove by id. `false` if the room or the id is unknown.
    pub fn delete(&mut self, room_id: &str, shape_id: &str) -> bool {
        self.rooms
            .get_mut(room_id)
            .and_then(|board| board.remove(shape_id))
            .is_some()
    }

    /// Empty a room. Returns the number of removed shapes.
    pub fn clear(&mut self, room_id: &str) -> usize {
        self.rooms.get_mut(room_id).map_or(0, Board::clear)
    }

    /// Overwrite a room's whole sequence. `false` if the room is unknown.
    pub fn replace_all(&mut self, room_id: &str, shapes: Vec<Shape>) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(board) => {
                board.replace_all(shapes);
                true
            }
            None => false,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total shapes across all rooms.
    pub fn shape_count(&self) -> usize {
        self.rooms.values().map(Board::len).sum()
    }
}
