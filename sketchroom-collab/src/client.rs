//! WebSocket sync client.
//!
//! Wraps a [`BoardReplica`]: local edits mutate the replica and go out as
//! client events, server broadcasts are applied to it by a reader task and
//! then surfaced as [`SyncEvent`]s.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sketchroom_core::protocol::{ClientEvent, ProtocolError, RosterEntry, ServerEvent};
use sketchroom_core::replica::BoardReplica;
use sketchroom_core::shape::Shape;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::{self, Message};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    /// A server event, already applied to the replica.
    Remote(ServerEvent),
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("not connected")]
    Disconnected,
}

/// Events buffered for the application before new ones are dropped.
const EVENT_CAPACITY: usize = 256;

/// The sync client.
pub struct SyncClient {
    replica: Arc<Mutex<BoardReplica>>,
    state: Arc<RwLock<ConnectionState>>,
    outgoing: mpsc::Sender<String>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
}

impl SyncClient {
    /// Connect to `url`, join `room_id` and spawn the reader and writer
    /// tasks.
    ///
    /// Edits may start right away; the replica replays them on top of the
    /// room snapshot when it arrives.
    pub async fn connect(
        url: &str,
        room_id: impl Into<String>,
        nickname: Option<String>,
    ) -> Result<Self, ClientError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let mut replica = BoardReplica::new(room_id);
        let join = replica.join(nickname).encode()?;
        let replica = Arc::new(Mutex::new(replica));
        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        let _ = event_tx.try_send(SyncEvent::Connected);

        // Writer task: forward outgoing frames to the WebSocket.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = ws_writer.send(Message::text(text)).await {
                    log::debug!("Client writer stopped: {e}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: apply server events to the replica.
        let reader_replica = replica.clone();
        let reader_state = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerEvent::decode(text.as_str()) {
                        Ok(event) => {
                            reader_replica.lock().await.apply_remote(&event);
                            if event_tx.try_send(SyncEvent::Remote(event)).is_err() {
                                log::trace!("Client event queue full, dropping notification");
                            }
                        }
                        Err(e) => log::warn!("Client dropped malformed frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            *reader_state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.try_send(SyncEvent::Disconnected);
        });

        let client = Self {
            replica,
            state,
            outgoing: out_tx,
            event_rx: Some(event_rx),
        };
        client.send_text(join).await?;
        Ok(client)
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Pointer-down: checkpoint the board for undo.
    pub async fn begin_gesture(&self) {
        self.replica.lock().await.begin_gesture();
    }

    pub async fn create_shape(&self, shape: Shape) -> Result<(), ClientError> {
        self.local(|replica| Some(replica.create_shape(shape))).await
    }

    /// No-op if the id is not on the local board.
    pub async fn update_shape(&self, shape: Shape) -> Result<(), ClientError> {
        self.local(|replica| replica.update_shape(shape)).await
    }

    pub async fn delete_shape(&self, id: &str) -> Result<(), ClientError> {
        self.local(|replica| replica.delete_shape(id)).await
    }

    pub async fn clear_board(&self) -> Result<(), ClientError> {
        self.local(|replica| Some(replica.clear_board())).await
    }

    pub async fn undo(&self) -> Result<(), ClientError> {
        self.local(BoardReplica::undo).await
    }

    pub async fn redo(&self) -> Result<(), ClientError> {
        self.local(BoardReplica::redo).await
    }

    pub async fn move_cursor(&self, x: f64, y: f64) -> Result<(), ClientError> {
        self.local(|replica| Some(replica.move_cursor(x, y))).await
    }

    pub async fn shapes(&self) -> Vec<Shape> {
        self.replica.lock().await.shapes().to_vec()
    }

    pub async fn roster(&self) -> Vec<RosterEntry> {
        self.replica.lock().await.roster().to_vec()
    }

    pub async fn room_id(&self) -> String {
        self.replica.lock().await.room_id().to_string()
    }

    /// Run a local edit and send the event it produced, if any.
    async fn local<F>(&self, edit: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut BoardReplica) -> Option<ClientEvent>,
    {
        let event = {
            let mut replica = self.replica.lock().await;
            edit(&mut *replica)
        };
        match event {
            Some(event) => self.send_text(event.encode()?).await,
            None => Ok(()),
        }
    }

    async fn send_text(&self, text: String) -> Result<(), ClientError> {
        if *self.state.read().await == ConnectionState::Disconnected {
            return Err(ClientError::Disconnected);
        }
        self.outgoing
            .send(text)
            .await
            .map_err(|_| ClientError::Disconnected)
    }
}
