//! sketchroom server binary.
//!
//! Configuration comes from the environment:
//! - `SKETCHROOM_BIND`: listen address (default `127.0.0.1:4000`)
//! - `PORT`: listen on `0.0.0.0:$PORT` when `SKETCHROOM_BIND` is unset
//! - `SKETCHROOM_DATA_DIR`: RocksDB directory; rooms stay in memory without it
//! - `SKETCHROOM_OUTBOX_CAPACITY`: frames buffered per client before eviction
//! - `RUST_LOG`: log filter (default `info`)

use log::info;
use sketchroom_collab::server::{ServerConfig, SyncServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    info!("Starting sketchroom server on {}", config.bind_addr);

    let server = SyncServer::bind(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
