//! RocksDB-backed project store.
//!
//! Column families:
//! - `documents`: document JSON snapshots, LZ4 compressed, keyed by project id
//! - `metadata`: `ProjectMetadata` (bincode), keyed by project id
//!
//! Snapshot and metadata for a project are always written in one batch.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

use loom_core::Document;

use super::{ProjectStore, StoreError, StoredProject};

const CF_DOCUMENTS: &str = "documents";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("loom_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, caller-provided directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Bookkeeping stored next to each snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub id: String,
    pub name: String,
    /// Bumped on every update
    pub revision: u64,
    /// Uncompressed JSON size in bytes
    pub snapshot_size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Seconds since epoch
    pub created_at: u64,
    /// Seconds since epoch
    pub updated_at: u64,
}

impl ProjectMetadata {
    fn new(id: &str, name: &str) -> Self {
        let now = unix_now();
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            revision: 0,
            snapshot_size: 0,
            compressed_size: 0,
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

/// RocksDB-backed project store.
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

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(&config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;
        log::info!("Opened project store at {}", config.path.display());

        Ok(Self { db, config })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);

        // Values are already LZ4 framed by us.
        opts.set_compression_type(DBCompressionType::None);
        opts.optimize_for_point_lookup(config.block_cache_size as u64);
        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn write_snapshot(&self, mut meta: ProjectMetadata, document: &Document) -> Result<ProjectMetadata, StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let json = serde_json::to_vec(document).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&json);
        meta.snapshot_size = json.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.updated_at = unix_now();

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_docs, meta.id.as_bytes(), &compressed);
        batch.put_cf(cf_meta, meta.id.as_bytes(), meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(meta)
    }

    pub fn load_metadata(&self, id: &str) -> Result<ProjectMetadata, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => ProjectMetadata::decode(&bytes),
            None => Err(StoreError::NotFound(id.to_owned())),
        }
    }

    /// Ids of every stored project.
    pub fn list_projects(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

impl ProjectStore for RocksStore {
    fn load(&self, id: &str) -> Result<Document, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let compressed = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let json = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    fn create(&self, name: &str, document: Document) -> Result<StoredProject, StoreError> {
        let id = Uuid::new_v4().to_string();
        let meta = self.write_snapshot(ProjectMetadata::new(&id, name), &document)?;
        log::debug!("Created project {id} ({} bytes compressed)", meta.compressed_size);
        Ok(StoredProject {
            id,
            name: name.to_owned(),
            document,
        })
    }

    fn update(&self, id: &str, document: &Document) -> Result<(), StoreError> {
        let mut meta = self.load_metadata(id)?;
        meta.revision += 1;
        self.write_snapshot(meta, document)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        // Surface NotFound for unknown ids.
        self.load_metadata(id)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_DOCUMENTS)?, id.as_bytes());
        batch.delete_cf(self.cf(CF_METADATA)?, id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::pages;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_open() {
        let (dir, store) = open_temp();
        assert_eq!(store.path(), dir.path());
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn test_create_load_update() {
        let (_dir, store) = open_temp();
        let created = store.create("Shop", Document::default()).unwrap();
        assert_eq!(store.load(&created.id).unwrap(), Document::default());

        let meta = store.load_metadata(&created.id).unwrap();
        assert_eq!(meta.name, "Shop");
        assert_eq!(meta.revision, 0);
        assert!(meta.compressed_size > 0);

        let edited = pages::add_page(&created.document, "Cart").unwrap();
        store.update(&created.id, &edited).unwrap();
        assert_eq!(store.load(&created.id).unwrap(), edited);
        assert_eq!(store.load_metadata(&created.id).unwrap().revision, 1);
    }

    #[test]
    fn test_delete_and_not_found() {
        let (_dir, store) = open_temp();
        let created = store.create("Tmp", Document::default()).unwrap();
        assert_eq!(store.list_projects().unwrap(), vec![created.id.clone()]);

        store.delete(&created.id).unwrap();
        assert_eq!(store.load(&created.id), Err(StoreError::NotFound(created.id.clone())));
        assert!(matches!(store.delete(&created.id), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update("missing", &Document::default()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = ProjectMetadata::new("id-1", "Name");
        let decoded = ProjectMetadata::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
    }
}
