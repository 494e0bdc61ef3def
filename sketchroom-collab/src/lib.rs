//! # sketchroom-collab (real-time whiteboard sync server and client)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   WebSocket (JSON)   ┌──────────────────────────────┐
//! │ SyncClient  │ ◄──────────────────► │ SyncServer                   │
//! │ BoardReplica│                      │  conn task ─► SessionGateway │
//! └─────────────┘                      │   PresenceRegistry           │
//!                                      │   ShapeStore                 │
//!                                      │   BroadcastRouter ─► outboxes│
//!                                      └──────────────┬───────────────┘
//!                                                     │ PersistOp
//!                                             ┌───────┴────────┐
//!                                             │PersistenceQueue│
//!                                             │ RocksStore     │
//!                                             └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`presence`]: connection → room, nickname, color, cursor
//! - [`store`]: authoritative room → ordered shapes
//! - [`broadcast`]: per-connection outboxes, origin excluded
//! - [`gateway`]: the single event loop owning all of the above
//! - [`storage`]: room repository trait, RocksDB and in-memory stores, write queue
//! - [`server`]: WebSocket listener and connection tasks
//! - [`client`]: WebSocket client around a [`BoardReplica`](sketchroom_core::BoardReplica)

pub mod broadcast;
pub mod client;
pub mod gateway;
pub mod presence;
pub mod server;
pub mod storage;
pub mod store;

pub use broadcast::{BroadcastRouter, BroadcastStats, Frame};
pub use client::{ClientError, ConnectionState, SyncClient, SyncEvent};
pub use gateway::{GatewayCommand, GatewayHandle, ServerStats, SessionGateway};
pub use presence::{PresenceRegistry, Session, DEFAULT_NICKNAME, PALETTE};
pub use server::{ServerConfig, ServerError, SyncServer};
pub use storage::{
    MemoryStore, PersistOp, PersistStats, PersistenceQueue, RocksStore, RoomMetadata,
    RoomRepository, StoreConfig, StoreError,
};
pub use store::ShapeStore;
