//! Fan-out of accepted mutations to the other members of a room.
//!
//! Every connection owns a bounded outbox (tokio mpsc). An event is encoded
//! once and the same `Arc<str>` frame is queued on every recipient's outbox,
//! so per-peer delivery order is exactly the order in which the gateway
//! processed events.
//!
//! A recipient whose outbox is full is evicted: its sender is dropped, the
//! connection task sees the channel close and hangs up. A slow peer therefore
//! loses its connection (and resyncs on rejoin) instead of silently missing
//! an event in the middle of the stream.

use std::collections::HashMap;
use std::sync::Arc;

use sketchroom_core::protocol::{ConnectionId, ServerEvent};
use tokio::sync::mpsc::{self, error::TrySendError};

/// One encoded text frame, shared between all recipients.
pub type Frame = Arc<str>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Events encoded and handed to the router.
    pub messages_sent: u64,
    /// Frames queued on individual outboxes.
    pub deliveries: u64,
    /// Recipients dropped because their outbox was full.
    pub peers_evicted: u64,
}

#[derive(Debug, Default)]
pub struct BroadcastRouter {
    outboxes: HashMap<ConnectionId, mpsc::Sender<Frame>>,
    stats: BroadcastStats,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection's outbox.
    pub fn register(&mut self, connection_id: ConnectionId, outbox: mpsc::Sender<Frame>) {
        self.outboxes.insert(connection_id, outbox);
    }

    /// Detach a connection's outbox. Dropping the sender ends the
    /// connection's write side.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> bool {
        self.outboxes.remove(connection_id).is_some()
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.outboxes.contains_key(connection_id)
    }

    /// Send an event to a single connection (join snapshot, replies).
    pub fn send_to(&mut self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        let Some(frame) = Self::encode(event) else {
            return false;
        };
        self.stats.messages_sent += 1;
        self.deliver(connection_id, frame)
    }

    /// Send an event to every recipient except `origin`.
    ///
    /// Returns the number of outboxes the frame was queued on.
    pub fn broadcast(
        &mut self,
        recipients: &[ConnectionId],
        origin: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let Some(frame) = Self::encode(event) else {
            return 0;
        };
        self.stats.messages_sent += 1;

        let mut reached = 0;
        for id in recipients.iter().filter(|id| Some(**id) != origin) {
            if self.deliver(*id, frame.clone()) {
                reached += 1;
            }
        }
        reached
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats.clone()
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    fn encode(event: &ServerEvent) -> Option<Frame> {
        match event.encode() {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                log::error!("Failed to encode {} event: {e}", event.name());
                None
            }
        }
    }

    fn deliver(&mut self, connection_id: ConnectionId, frame: Frame) -> bool {
        let Some(outbox) = self.outboxes.get(&connection_id) else {
            return false;
        };
        match outbox.try_send(frame) {
            Ok(()) => {
                self.stats.deliveries += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("Outbox of {connection_id} is full, evicting slow peer");
                self.outboxes.remove(&connection_id);
                self.stats.peers_evicted += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("Outbox of {connection_id} already closed");
                self.outboxes.remove(&connection_id);
                false
            }
        }
    }
}
