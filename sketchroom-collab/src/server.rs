//! WebSocket sync server.
//!
//! Architecture:
//! ```text
//! Client A ──► conn task ──┐                     ┌──► outbox ──► conn task ──► Client A
//!                          ├──► SessionGateway ──┤
//! Client B ──► conn task ──┘        │            └──► outbox ──► conn task ──► Client B
//!                                   ▼
//!                           PersistenceQueue ──► RocksStore | MemoryStore
//! ```
//!
//! One task per connection. It decodes text frames into client events for
//! the gateway and writes whatever lands in its outbox back to the socket.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sketchroom_core::protocol::ClientEvent;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use uuid::Uuid;

use crate::broadcast::Frame;
use crate::gateway::{GatewayHandle, ServerStats, SessionGateway};
use crate::storage::{
    MemoryStore, PersistenceQueue, RocksStore, RoomRepository, StoreConfig, StoreError,
};

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Frames buffered per connection before the peer is evicted
    pub outbox_capacity: usize,
    /// Gateway command channel capacity
    pub command_capacity: usize,
    /// Persistence queue capacity
    pub persist_queue_capacity: usize,
    /// RocksDB directory (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            outbox_capacity: 256,
            command_capacity: 1024,
            persist_queue_capacity: 1024,
            storage_path: None,
        }
    }
}

impl ServerConfig {
    /// Read `SKETCHROOM_BIND` (or `PORT`), `SKETCHROOM_DATA_DIR` and
    /// `SKETCHROOM_OUTBOX_CAPACITY`.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("SKETCHROOM_BIND") {
            config.bind_addr = bind;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("PORT must be a port number, got {port:?}")))?;
            config.bind_addr = format!("0.0.0.0:{port}");
        }

        if let Some(dir) = lookup("SKETCHROOM_DATA_DIR").filter(|d| !d.is_empty()) {
            config.storage_path = Some(PathBuf::from(dir));
        }

        if let Some(capacity) = lookup("SKETCHROOM_OUTBOX_CAPACITY") {
            config.outbox_capacity = capacity
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| {
                    ServerError::Config(format!(
                        "SKETCHROOM_OUTBOX_CAPACITY must be a positive integer, got {capacity:?}"
                    ))
                })?;
        }

        Ok(config)
    }

    pub fn with_storage(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    gateway: GatewayHandle,
    persistence: PersistenceQueue,
}

impl SyncServer {
    /// Open storage, start the gateway and bind the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let repo: Arc<dyn RoomRepository> = match &config.storage_path {
            Some(path) => Arc::new(RocksStore::open(StoreConfig::new(path))?),
            None => {
                log::info!("No data directory configured, rooms are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Self::with_repository(config, repo).await
    }

    /// Like [`SyncServer::bind`], persisting to `repo` instead of the store
    /// named by `config.storage_path`.
    pub async fn with_repository(
        config: ServerConfig,
        repo: Arc<dyn RoomRepository>,
    ) -> Result<Self, ServerError> {
        let persistence = PersistenceQueue::spawn(repo, config.persist_queue_capacity);
        let (gateway, _) =
            SessionGateway::new(Some(persistence.clone())).spawn(config.command_capacity);

        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            listener,
            local_addr,
            gateway,
            persistence,
        })
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then flush pending
    /// writes.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        log::info!("Sync server listening on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    log::debug!("New TCP connection from {addr}");

                    let gateway = self.gateway.clone();
                    let outbox_capacity = self.config.outbox_capacity;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, gateway, outbox_capacity).await {
                            log::error!("Connection error from {addr}: {e}");
                        }
                    });
                }
                () = &mut shutdown => break,
            }
        }

        log::info!("Shutting down, flushing pending writes");
        self.persistence.flush().await;
        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.gateway.stats().await.unwrap_or_default()
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &GatewayHandle {
        &self.gateway
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    gateway: GatewayHandle,
    outbox_capacity: usize,
) -> Result<(), ServerError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();
    let (outbox_tx, mut outbox) = mpsc::channel::<Frame>(outbox_capacity.max(1));
    if !gateway.connect(connection_id, outbox_tx).await {
        log::warn!("Gateway stopped, refusing connection from {addr}");
        return Ok(());
    }
    log::info!("WebSocket connection {connection_id} established from {addr}");

    let result: Result<(), ServerError> = async {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => match ClientEvent::decode(text.as_str()) {
                        Ok(event) => {
                            if !gateway.event(connection_id, event).await {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Dropped frame from {connection_id}: {e}"),
                    },
                    Some(Ok(Message::Binary(_))) => {
                        log::warn!("Dropped binary frame from {connection_id}");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },

                frame = outbox.recv() => match frame {
                    Some(frame) => ws_sender.send(Message::text(frame.to_string())).await?,
                    None => {
                        log::warn!("Connection {connection_id} evicted");
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                },
            }
        }
        Ok(())
    }
    .await;

    gateway.disconnect(connection_id).await;
    log::info!("Connection {connection_id} from {addr} closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:4000");
        assert_eq!(config.outbox_capacity, 256);
        assert_eq!(config.command_capacity, 1024);
        assert_eq!(config.persist_queue_capacity, 1024);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_config_from_empty_env() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_config_port_binds_all_interfaces() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "8080")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_config_bind_wins_over_port() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("SKETCHROOM_BIND", "127.0.0.1:9999"),
            ("SKETCHROOM_DATA_DIR", "/tmp/rooms"),
            ("SKETCHROOM_OUTBOX_CAPACITY", "32"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9999");
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/rooms")));
        assert_eq!(config.outbox_capacity, 32);
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("PORT", "http")])),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("SKETCHROOM_OUTBOX_CAPACITY", "0")])),
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        };
        let server = SyncServer::bind(config).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.stats().await, ServerStats::default());
    }

    #[tokio::test]
    async fn test_bind_with_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        }
        .with_storage(dir.path().join("db"));
        let server = SyncServer::bind(config).await.unwrap();
        assert!(dir.path().join("db").exists());
        assert_eq!(server.stats().await.rooms, 0);
    }
}
