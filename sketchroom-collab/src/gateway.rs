//! Session gateway: the single event loop that owns every room.
//!
//! ```text
//!  conn task ──┐                      ┌──► outbox(conn 1)
//!  conn task ──┼─► GatewayCommand ──► SessionGateway ──► outbox(conn 2)
//!  conn task ──┘      (mpsc)          │   presence / store / router
//!                                     └──► PersistenceQueue (fire-and-forget)
//! ```
//!
//! Connection tasks never touch shared state; they forward decoded events
//! here and drain their outbox. Each command runs to completion, mutation
//! and broadcast included, before the next one is taken, so every peer sees
//! a room's events in the order they were accepted.
//!
//! Joining a room that is not in memory starts a load on the persistence
//! queue. Until it resolves, the join and every later command for that room
//! (or from a connection already waiting on it) are parked in arrival order
//! and replayed afterwards. The loop itself never waits on I/O.

use std::collections::HashMap;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use sketchroom_core::protocol::{ClientEvent, ConnectionId, JoinRoom, ServerEvent, UserLeft};
use sketchroom_core::shape::Shape;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastRouter, Frame};
use crate::presence::PresenceRegistry;
use crate::storage::{LoadResult, PersistOp, PersistenceQueue, StoreError};
use crate::store::ShapeStore;

/// Input to the event loop.
#[derive(Debug)]
pub enum GatewayCommand {
    /// A connection was accepted; frames for it go to `outbox`.
    Connect {
        connection_id: ConnectionId,
        outbox: mpsc::Sender<Frame>,
    },
    /// A decoded client event.
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<ServerStats>,
    },
}

impl GatewayCommand {
    fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            GatewayCommand::Connect { connection_id, .. }
            | GatewayCommand::Event { connection_id, .. }
            | GatewayCommand::Disconnect { connection_id } => Some(*connection_id),
            GatewayCommand::Stats { .. } => None,
        }
    }
}

/// Point-in-time server counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Live connections, joined or not.
    pub connections: usize,
    /// Rooms held in memory.
    pub rooms: usize,
    pub shapes: usize,
    /// Client events handed to the gateway.
    pub messages_in: u64,
    /// Events fanned out by the broadcast router.
    pub broadcasts: u64,
    /// Peers disconnected for falling behind.
    pub evicted: u64,
    pub persist_ok: u64,
    pub persist_failed: u64,
    pub persist_dropped: u64,
}

/// Sending half of the gateway's command channel.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    commands: mpsc::Sender<GatewayCommand>,
}

impl GatewayHandle {
    pub async fn connect(&self, connection_id: ConnectionId, outbox: mpsc::Sender<Frame>) -> bool {
        self.send(GatewayCommand::Connect {
            connection_id,
            outbox,
        })
        .await
    }

    pub async fn event(&self, connection_id: ConnectionId, event: ClientEvent) -> bool {
        self.send(GatewayCommand::Event {
            connection_id,
            event,
        })
        .await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.send(GatewayCommand::Disconnect { connection_id }).await;
    }

    /// `None` if the gateway has stopped.
    pub async fn stats(&self) -> Option<ServerStats> {
        let (reply, rx) = oneshot::channel();
        if !self.send(GatewayCommand::Stats { reply }).await {
            return None;
        }
        rx.await.ok()
    }

    async fn send(&self, command: GatewayCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }
}

pub struct SessionGateway {
    presence: PresenceRegistry,
    store: ShapeStore,
    router: BroadcastRouter,
    persistence: Option<PersistenceQueue>,
    /// Rooms being loaded, with the commands parked behind each load.
    loading: HashMap<String, Vec<GatewayCommand>>,
    loads: FuturesUnordered<BoxFuture<'static, (String, LoadResult)>>,
    messages_in: u64,
}

impl SessionGateway {
    /// Without a persistence queue, rooms start empty and nothing is saved.
    pub fn new(persistence: Option<PersistenceQueue>) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            store: ShapeStore::new(),
            router: BroadcastRouter::new(),
            persistence,
            loading: HashMap::new(),
            loads: FuturesUnordered::new(),
            messages_in: 0,
        }
    }

    /// Run the event loop on its own task.
    pub fn spawn(self, capacity: usize) -> (GatewayHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (GatewayHandle { commands: tx }, task)
    }

    /// Process commands until every [`GatewayHandle`] is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<GatewayCommand>) {
        log::info!("Session gateway started");
        loop {
            tokio::select! {
                Some((room_id, result)) = self.loads.next(), if !self.loads.is_empty() => {
                    self.on_room_loaded(room_id, result);
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        log::info!("Session gateway stopped");
    }

    pub fn handle_command(&mut self, command: GatewayCommand) {
        match command {
            GatewayCommand::Connect {
                connection_id,
                outbox,
            } => self.on_connect(connection_id, outbox),
            GatewayCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            GatewayCommand::Event {
                connection_id,
                event,
            } => {
                if let Some(room_id) = self.parked_behind(connection_id, Some(event.room_id())) {
                    self.park(room_id, GatewayCommand::Event { connection_id, event });
                    return;
                }
                self.messages_in += 1;
                self.on_event(connection_id, event);
            }
            GatewayCommand::Disconnect { connection_id } => {
                if let Some(room_id) = self.parked_behind(connection_id, None) {
                    self.park(room_id, GatewayCommand::Disconnect { connection_id });
                    return;
                }
                self.on_disconnect(connection_id);
            }
        }
    }

    pub fn stats(&self) -> ServerStats {
        let broadcast = self.router.stats();
        let persist = self
            .persistence
            .as_ref()
            .map(PersistenceQueue::stats)
            .unwrap_or_default();
        ServerStats {
            connections: self.presence.len(),
            rooms: self.store.room_count(),
            shapes: self.store.shape_count(),
            messages_in: self.messages_in,
            broadcasts: broadcast.messages_sent,
            evicted: broadcast.peers_evicted,
            persist_ok: persist.writes_ok,
            persist_failed: persist.writes_failed,
            persist_dropped: persist.writes_dropped,
        }
    }

    /// Current shapes of a room held in memory.
    pub fn snapshot(&self, room_id: &str) -> Option<Vec<Shape>> {
        self.store.snapshot(room_id)
    }

    pub fn is_loading(&self, room_id: &str) -> bool {
        self.loading.contains_key(room_id)
    }

    // ─── Loading ──────────────────────────────────────────────────────

    /// The loading room a command must wait behind: the room it targets, or
    /// any room the same connection already has commands parked on.
    fn parked_behind(&self, connection_id: ConnectionId, room_id: Option<&str>) -> Option<String> {
        if let Some(room_id) = room_id.filter(|r| self.loading.contains_key(*r)) {
            return Some(room_id.to_string());
        }
        self.loading
            .iter()
            .find(|(_, parked)| {
                parked
                    .iter()
                    .any(|c| c.connection_id() == Some(connection_id))
            })
            .map(|(room_id, _)| room_id.clone())
    }

    fn park(&mut self, room_id: String, command: GatewayCommand) {
        self.loading.entry(room_id).or_default().push(command);
    }

    fn start_load(&mut self, room_id: &str) -> bool {
        let Some(queue) = &self.persistence else {
            return false;
        };
        let pending = queue.load(room_id);
        let room = room_id.to_string();
        self.loads.push(
            async move {
                let result = pending.await.unwrap_or_else(|_| {
                    Err(StoreError::Unavailable("persistence worker stopped".into()))
                });
                (room, result)
            }
            .boxed(),
        );
        self.loading.insert(room_id.to_string(), Vec::new());
        log::debug!("Loading room {room_id}");
        true
    }

    pub fn on_room_loaded(&mut self, room_id: String, result: LoadResult) {
        let shapes = match result {
            Ok(Some(shapes)) => {
                log::info!("Loaded room {room_id} with {} shapes", shapes.len());
                shapes
            }
            Ok(None) => {
                log::info!("Created room {room_id}");
                self.persist(&room_id, PersistOp::Set(Vec::new()));
                Vec::new()
            }
            Err(e) => {
                log::error!("Failed to load room {room_id}, starting empty: {e}");
                Vec::new()
            }
        };
        self.store.insert_room(&room_id, shapes);

        for command in self.loading.remove(&room_id).unwrap_or_default() {
            self.handle_command(command);
        }
    }

    // ─── Connection lifecycle ─────────────────────────────────────────

    fn on_connect(&mut self, connection_id: ConnectionId, outbox: mpsc::Sender<Frame>) {
        self.presence.connect(connection_id);
        self.router.register(connection_id, outbox);
        log::info!("Connection {connection_id} opened");
    }

    fn on_disconnect(&mut self, connection_id: ConnectionId) {
        self.router.unregister(&connection_id);
        let Some(session) = self.presence.disconnect(&connection_id) else {
            return;
        };
        match session.room_id {
            Some(room_id) => {
                log::info!("{} ({connection_id}) left room {room_id}", session.nickname);
                self.announce_departure(connection_id, &room_id);
            }
            None => log::info!("Connection {connection_id} closed before joining"),
        }
    }

    /// Tell the remaining members of `room_id` that `connection_id` is gone.
    fn announce_departure(&mut self, connection_id: ConnectionId, room_id: &str) {
        let members = self.presence.members(room_id);
        if members.is_empty() {
            return;
        }
        self.router
            .broadcast(&members, None, &ServerEvent::UserLeft(UserLeft { connection_id }));
        let roster = self.presence.roster(room_id);
        self.router
            .broadcast(&members, None, &ServerEvent::RoomUsers(roster));
    }

    // ─── Events ───────────────────────────────────────────────────────

    fn on_event(&mut self, connection_id: ConnectionId, event: ClientEvent) {
        let is_join = matches!(event, ClientEvent::JoinRoom(_));
        if !is_join && !self.check_member(connection_id, event.room_id(), event.name()) {
            return;
        }

        match event {
            ClientEvent::JoinRoom(join) => self.on_join(connection_id, join),
            ClientEvent::CreateShape { room_id, stroke } => {
                self.on_create(connection_id, &room_id, stroke)
            }
            ClientEvent::UpdateShape { room_id, shape } => {
                self.on_update(connection_id, &room_id, shape)
            }
            ClientEvent::DeleteShape { room_id, shape_id } => {
                self.on_delete(connection_id, &room_id, shape_id)
            }
            ClientEvent::ClearBoard { room_id } => self.on_clear(connection_id, &room_id),
            ClientEvent::SnapshotBoard { room_id, strokes } => {
                self.on_snapshot(connection_id, &room_id, strokes)
            }
            ClientEvent::MoveCursor { room_id, x, y } => {
                self.on_cursor(connection_id, &room_id, x, y)
            }
        }
    }

    fn on_join(&mut self, connection_id: ConnectionId, join: JoinRoom) {
        if self.presence.session(&connection_id).is_none() {
            log::warn!("Rejected join_room from unknown connection {connection_id}");
            return;
        }

        let room_id = join.room_id.clone();
        if !self.store.contains_room(&room_id) {
            if self.start_load(&room_id) {
                self.park(
                    room_id,
                    GatewayCommand::Event {
                        connection_id,
                        event: ClientEvent::JoinRoom(join),
                    },
                );
                return;
            }
            self.store.insert_room(&room_id, Vec::new());
            log::info!("Created room {room_id}");
        }

        let Some(outcome) = self.presence.join(connection_id, &room_id, join.nickname) else {
            return;
        };
        if let Some(previous) = &outcome.previous_room {
            log::info!("Connection {connection_id} left room {previous}");
            self.announce_departure(connection_id, previous);
        }

        let shapes = self.store.snapshot(&room_id).unwrap_or_default();
        log::info!(
            "Connection {connection_id} joined room {room_id} ({} shapes, color {})",
            shapes.len(),
            outcome.color
        );
        self.router
            .send_to(connection_id, &ServerEvent::BoardSnapshot(shapes));

        let roster = self.presence.roster(&room_id);
        self.broadcast_room(&room_id, None, &ServerEvent::RoomUsers(roster));
    }

    fn on_create(&mut self, origin: ConnectionId, room_id: &str, shape: Shape) {
        if let Some(placement) = self.store.create(room_id, shape.clone()) {
            log::debug!("{placement:?} {} {} in room {room_id}", shape.tool(), shape.id);
        }
        self.broadcast_room(room_id, Some(origin), &ServerEvent::ShapeCreated(shape.clone()));
        self.persist(room_id, PersistOp::Append(shape));
    }

    fn on_update(&mut self, origin: ConnectionId, room_id: &str, shape: Shape) {
        let changed = self.store.update(room_id, shape.clone());
        self.broadcast_room(room_id, Some(origin), &ServerEvent::ShapeUpdated(shape.clone()));
        if changed {
            log::debug!("Updated {} in room {room_id}", shape.id);
            self.persist(room_id, PersistOp::Replace(shape));
        } else {
            log::debug!("Update for unknown shape {} in room {room_id}", shape.id);
        }
    }

    fn on_delete(&mut self, origin: ConnectionId, room_id: &str, shape_id: String) {
        let changed = self.store.delete(room_id, &shape_id);
        self.broadcast_room(room_id, Some(origin), &ServerEvent::ShapeDeleted(shape_id.clone()));
        if changed {
            log::debug!("Deleted {shape_id} from room {room_id}");
            self.persist(room_id, PersistOp::Remove(shape_id));
        } else {
            log::debug!("Delete for unknown shape {shape_id} in room {room_id}");
        }
    }

    fn on_clear(&mut self, origin: ConnectionId, room_id: &str) {
        let removed = self.store.clear(room_id);
        log::debug!("Cleared room {room_id} ({removed} shapes)");
        self.broadcast_room(room_id, Some(origin), &ServerEvent::BoardCleared);
        self.persist(room_id, PersistOp::Set(Vec::new()));
    }

    fn on_snapshot(&mut self, origin: ConnectionId, room_id: &str, shapes: Vec<Shape>) {
        self.store.replace_all(room_id, shapes);
        let current = self.store.snapshot(room_id).unwrap_or_default();
        log::debug!("Snapshot of room {room_id} ({} shapes)", current.len());
        self.broadcast_room(room_id, Some(origin), &ServerEvent::BoardSnapshot(current.clone()));
        self.persist(room_id, PersistOp::Set(current));
    }

    fn on_cursor(&mut self, origin: ConnectionId, room_id: &str, x: f64, y: f64) {
        let Some(update) = self.presence.move_cursor(&origin, x, y) else {
            return;
        };
        log::trace!("Cursor of {origin} at ({x}, {y}) in room {room_id}");
        self.broadcast_room(room_id, Some(origin), &ServerEvent::CursorMoved(update));
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn check_member(&self, connection_id: ConnectionId, room_id: &str, event: &str) -> bool {
        if self.presence.is_member(&connection_id, room_id) {
            return true;
        }
        match self.presence.room_of(&connection_id) {
            Some(joined) => {
                log::warn!(
                    "Rejected {event} from {connection_id}: targets room {room_id} but joined {joined}"
                );
                false
            }
            None => {
                log::warn!("Rejected {event} from {connection_id}: not joined to a room");
                false
            }
        }
    }

    fn broadcast_room(
        &mut self,
        room_id: &str,
        origin: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let members = self.presence.members(room_id);
        self.router.broadcast(&members, origin, event)
    }

    fn persist(&self, room_id: &str, op: PersistOp) {
        if let Some(queue) = &self.persistence {
            queue.enqueue(room_id, op);
        }
    }
}
