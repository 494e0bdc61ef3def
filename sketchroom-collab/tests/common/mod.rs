//! Shared helpers: start a server on an ephemeral port and drive it with raw
//! WebSocket clients.

#![allow(dead_code)]

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use sketchroom_collab::gateway::GatewayHandle;
use sketchroom_collab::server::{ServerConfig, SyncServer};
use sketchroom_collab::storage::{MemoryStore, RoomRepository};
use sketchroom_core::protocol::{ClientEvent, JoinRoom, RosterEntry, ServerEvent};
use sketchroom_core::shape::Shape;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub url: String,
    pub gateway: GatewayHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_repository(Arc::new(MemoryStore::new())).await
    }

    pub async fn with_repository(repo: Arc<dyn RoomRepository>) -> Self {
        Self::with_config(test_config(), repo).await
    }

    pub async fn with_config(config: ServerConfig, repo: Arc<dyn RoomRepository>) -> Self {
        let server = SyncServer::with_repository(config, repo).await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let gateway = server.gateway().clone();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        Self {
            url,
            gateway,
            shutdown: Some(tx),
            task,
        }
    }

    /// Stop accepting and wait until pending writes are flushed.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }

    /// Poll the gateway until `check` holds.
    pub async fn wait_until(&self, check: impl Fn(&sketchroom_collab::ServerStats) -> bool) {
        for _ in 0..200 {
            if let Some(stats) = self.gateway.stats().await {
                if check(&stats) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server never reached the expected state");
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        ..ServerConfig::default()
    }
}

pub async fn connect(url: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

pub async fn send(ws: &mut Ws, event: &ClientEvent) {
    send_raw(ws, &event.encode().unwrap()).await;
}

pub async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::text(text.to_string())).await.unwrap();
}

/// Next text frame as raw JSON.
pub async fn recv_json(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

pub async fn recv(ws: &mut Ws) -> ServerEvent {
    serde_json::from_value(recv_json(ws).await).unwrap()
}

/// Assert that nothing arrives for a short while.
pub async fn assert_silent(ws: &mut Ws) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_millis(200), ws.next()).await {
        panic!("unexpected frame: {}", text.as_str());
    }
}

/// Join and consume the snapshot and roster the server answers with.
pub async fn join(ws: &mut Ws, room: &str, nickname: &str) -> (Vec<Shape>, Vec<RosterEntry>) {
    send(
        ws,
        &ClientEvent::JoinRoom(JoinRoom::new(room, Some(nickname.to_string()))),
    )
    .await;
    let shapes = match recv(ws).await {
        ServerEvent::BoardSnapshot(shapes) => shapes,
        other => panic!("expected board:snapshot, got {other:?}"),
    };
    let roster = match recv(ws).await {
        ServerEvent::RoomUsers(roster) => roster,
        other => panic!("expected room:users, got {other:?}"),
    };
    (shapes, roster)
}

/// Read frames until a `room:users` arrives.
pub async fn next_roster(ws: &mut Ws) -> Vec<RosterEntry> {
    loop {
        if let ServerEvent::RoomUsers(roster) = recv(ws).await {
            return roster;
        }
    }
}

pub fn create(room: &str, shape: Shape) -> ClientEvent {
    ClientEvent::CreateShape {
        room_id: room.into(),
        stroke: shape,
    }
}
