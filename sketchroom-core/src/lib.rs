//! # sketchroom-core: shared board model for sketchroom
//!
//! Types used on both ends of the connection:
//!
//! - [`shape`]: closed tagged shape variant with common base fields
//! - [`board`]: ordered shape arena (arrival order = z-order)
//! - [`history`]: client-local undo/redo over whole-board snapshots
//! - [`protocol`]: JSON event envelopes for both directions
//! - [`replica`]: sans-IO client copy of one room

pub mod board;
pub mod history;
pub mod protocol;
pub mod replica;
pub mod shape;

pub use board::{Board, Placement};
pub use history::History;
pub use protocol::{
    ClientEvent, ConnectionId, CursorUpdate, JoinRoom, ProtocolError, RosterEntry, ServerEvent,
    UserLeft,
};
pub use replica::{BoardReplica, RemoteCursor};
pub use shape::{Point, Shape, ShapeError, ShapeKind, Transform};
