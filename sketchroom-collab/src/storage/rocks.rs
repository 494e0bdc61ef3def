//! RocksDB-backed room store.
//!
//! Column families:
//! - `rooms`: `{ roomId, shapes }` documents as JSON, LZ4 compressed, keyed by room id
//! - `metadata`: [`RoomMetadata`] (bincode), keyed by room id
//!
//! Both are written in one batch, so a room's metadata always describes the
//! shape list stored next to it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use sketchroom_core::shape::Shape;

use super::{RoomRepository, StoreError};

const CF_ROOMS: &str = "rooms";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_ROOMS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write (default: false)
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sketchroom_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Small caches, for tests against a temp directory.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 1024 * 1024,
        }
    }
}

/// Bookkeeping stored next to each room document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMetadata {
    pub room_id: String,
    pub shape_count: u64,
    /// Number of saves since the room was first written.
    pub revision: u64,
    /// Seconds since epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl RoomMetadata {
    fn new(room_id: &str) -> Self {
        let now = unix_now();
        Self {
            room_id: room_id.to_string(),
            shape_count: 0,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomDocumentRef<'a> {
    room_id: &'a str,
    shapes: &'a [Shape],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomDocument {
    #[allow(dead_code)]
    room_id: String,
    shapes: Vec<Shape>,
}

/// RocksDB-backed room store.
pub struct RocksStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open the store, creating the database and column families if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cache = Cache::new_lru_cache(config.block_cache_size);
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config, &cache)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened room store at {}", config.path.display());
        Ok(Self { db, config })
    }

    /// Every column family reads through the one shared block cache.
    fn cf_options(name: &str, config: &StoreConfig, cache: &Cache) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            // Values are already LZ4 framed.
            CF_ROOMS => opts.set_compression_type(DBCompressionType::None),
            CF_METADATA => opts.set_compression_type(DBCompressionType::Lz4),
            _ => {}
        }

        opts
    }

    /// Metadata for a stored room, `None` if it was never saved.
    pub fn metadata(&self, room_id: &str) -> Result<Option<RoomMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(cf, room_id.as_bytes())? {
            Some(bytes) => Ok(Some(RoomMetadata::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Ids of every stored room, in key order.
    pub fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut rooms = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let room_id = String::from_utf8(key.into_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            rooms.push(room_id);
        }
        Ok(rooms)
    }

    /// Remove a room's document and metadata.
    pub fn delete_room(&self, room_id: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_ROOMS)?, room_id.as_bytes());
        batch.delete_cf(self.cf(CF_METADATA)?, room_id.as_bytes());
        self.write(batch)
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }
}

impl RoomRepository for RocksStore {
    fn load(&self, room_id: &str) -> Result<Option<Vec<Shape>>, StoreError> {
        let cf = self.cf(CF_ROOMS)?;
        let Some(compressed) = self.db.get_cf(cf, room_id.as_bytes())? else {
            return Ok(None);
        };
        let json = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        let document: RoomDocument = serde_json::from_slice(&json)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(Some(document.shapes))
    }

    fn save(&self, room_id: &str, shapes: &[Shape]) -> Result<(), StoreError> {
        let json = serde_json::to_vec(&RoomDocumentRef { room_id, shapes })
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&json);

        let mut meta = self
            .metadata(room_id)?
            .unwrap_or_else(|| RoomMetadata::new(room_id));
        meta.shape_count = shapes.len() as u64;
        meta.revision += 1;
        meta.updated_at = unix_now();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_ROOMS)?, room_id.as_bytes(), &compressed);
        batch.put_cf(self.cf(CF_METADATA)?, room_id.as_bytes(), meta.encode()?);
        self.write(batch)?;

        log::trace!(
            "Saved room {room_id}: {} shapes, {} bytes compressed, revision {}",
            shapes.len(),
            compressed.len(),
            meta.revision
        );
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
