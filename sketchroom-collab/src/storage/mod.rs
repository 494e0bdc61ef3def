//! Persistence adapter: the durable mirror of each room's shape list.
//!
//! Architecture:
//! ```text
//! ┌────────────────┐  PersistOp   ┌──────────────────┐  load/save  ┌──────────────┐
//! │ SessionGateway │ ───────────► │ PersistenceQueue │ ──────────► │RoomRepository│
//! │ (event loop)   │  try_send    │ (worker task)    │  blocking   │ Rocks/Memory │
//! └────────────────┘              └──────────────────┘    pool     └──────────────┘
//! ```
//!
//! Writes are fire-and-forget: the gateway never waits for them, and a
//! failed write is logged and counted without affecting the broadcast path.
//! The stored layout per room is `{ roomId, shapes: Shape[] }`, keyed by room id.

pub mod memory;
pub mod queue;
pub mod rocks;

pub use memory::MemoryStore;
pub use queue::{LoadResult, PersistStats, PersistenceQueue};
pub use rocks::{RocksStore, RoomMetadata, StoreConfig};

use sketchroom_core::board::Board;
use sketchroom_core::shape::Shape;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// One durable mutation, mirroring an accepted in-memory mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    /// Append (upsert: an existing id is replaced in place).
    Append(Shape),
    /// Replace by id in place; no-op if absent.
    Replace(Shape),
    /// Pull by id.
    Remove(String),
    /// Set the whole list. Clear is `Set(vec![])`.
    Set(Vec<Shape>),
}

impl PersistOp {
    /// Apply this operation to an in-memory board.
    pub fn apply_to(&self, board: &mut Board) {
        match self {
            PersistOp::Append(shape) => {
                board.append(shape.clone());
            }
            PersistOp::Replace(shape) => {
                board.replace(shape.clone());
            }
            PersistOp::Remove(id) => {
                board.remove(id);
            }
            PersistOp::Set(shapes) => board.replace_all(shapes.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PersistOp::Append(_) => "append",
            PersistOp::Replace(_) => "replace",
            PersistOp::Remove(_) => "remove",
            PersistOp::Set(_) => "set",
        }
    }
}

/// Narrow interface to the document store.
///
/// Implementations are called from the blocking thread pool, one job at a
/// time, in the order the gateway accepted the mutations.
pub trait RoomRepository: Send + Sync + 'static {
    /// Stored shapes for a room, `None` if the room was never saved.
    fn load(&self, room_id: &str) -> Result<Option<Vec<Shape>>, StoreError>;

    /// Overwrite a room's stored shapes.
    fn save(&self, room_id: &str, shapes: &[Shape]) -> Result<(), StoreError>;

    /// Apply one mutation as read → modify → write.
    fn apply(&self, room_id: &str, op: &PersistOp) -> Result<(), StoreError> {
        if let PersistOp::Set(shapes) = op {
            return self.save(room_id, Board::from_shapes(shapes.clone()).shapes());
        }
        let mut board = Board::from_shapes(self.load(room_id)?.unwrap_or_default());
        op.apply_to(&mut board);
        self.save(room_id, board.shapes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchroom_core::shape::ShapeKind;

    fn circle(id: &str, radius: f64) -> Shape {
        Shape::new(id, ShapeKind::Circle { radius })
    }

    #[test]
    fn test_default_apply_sequence() {
        let store = MemoryStore::new();

        store.apply("r1", &PersistOp::Append(circle("a", 1.0))).unwrap();
        store.apply("r1", &PersistOp::Append(circle("b", 1.0))).unwrap();
        store.apply("r1", &PersistOp::Replace(circle("a", 4.0))).unwrap();
        store.apply("r1", &PersistOp::Remove("b".into())).unwrap();

        assert_eq!(store.load("r1").unwrap(), Some(vec![circle("a", 4.0)]));

        store.apply("r1", &PersistOp::Set(Vec::new())).unwrap();
        assert_eq!(store.load("r1").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_replace_unknown_keeps_contents() {
        let store = MemoryStore::new();
        store.apply("r1", &PersistOp::Append(circle("a", 1.0))).unwrap();
        store.apply("r1", &PersistOp::Replace(circle("zz", 9.0))).unwrap();
        assert_eq!(store.load("r1").unwrap(), Some(vec![circle("a", 1.0)]));
    }

    #[test]
    fn test_op_names() {
        assert_eq!(PersistOp::Set(vec![]).name(), "set");
        assert_eq!(PersistOp::Remove("x".into()).name(), "remove");
    }
}
