//! In-process room store, used when no data directory is configured and in
//! tests.

use std::collections::HashMap;
use std::sync::Mutex;

use sketchroom_core::shape::Shape;

use super::{RoomRepository, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<String, Vec<Shape>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store, as if the rooms had been saved by an earlier run.
    pub fn with_rooms<I, S>(rooms: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Shape>)>,
        S: Into<String>,
    {
        Self {
            rooms: Mutex::new(rooms.into_iter().map(|(id, shapes)| (id.into(), shapes)).collect()),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }
}

impl RoomRepository for MemoryStore {
    fn load(&self, room_id: &str) -> Result<Option<Vec<Shape>>, StoreError> {
        let rooms = self
            .rooms
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(rooms.get(room_id).cloned())
    }

    fn save(&self, room_id: &str, shapes: &[Shape]) -> Result<(), StoreError> {
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        rooms.insert(room_id.to_string(), shapes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchroom_core::shape::ShapeKind;

    #[test]
    fn test_missing_room_loads_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load("nowhere").unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let shapes = vec![Shape::new("a", ShapeKind::Rect { width: 1.0, height: 2.0 })];
        store.save("r1", &shapes).unwrap();
        assert_eq!(store.load("r1").unwrap(), Some(shapes));
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn test_seeded() {
        let store = MemoryStore::with_rooms([("r1", Vec::new()), ("r2", Vec::new())]);
        assert_eq!(store.room_count(), 2);
        assert_eq!(store.load("r2").unwrap(), Some(Vec::new()));
    }
}
