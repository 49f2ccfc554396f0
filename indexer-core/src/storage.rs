//! Storage layer
//!
//! The indexer needs id-keyed reads, an atomic multi-entity write per event,
//! and a key scan at startup to recover tracked sources; all are behind
//! [`EntityStore`].
//!
//! # Column Families
//!
//! One column family per [`EntityFamily`] (see [`EntityFamily::cf_name`]),
//! key = entity id, value = bincode-encoded entity.
//!
//! - Mutable aggregates (`market`, `account_ctoken`, ...) use LZ4 for read speed
//! - Append-only audit records (`*_event`, `account_ctoken_tx`) use Zstd

use crate::{
    entities::EntityFamily,
    error::{Error, Result},
    Config,
};
use dashmap::DashMap;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One staged entity write
#[derive(Debug, Clone)]
pub struct EntityWrite {
    /// Entity family
    pub family: EntityFamily,
    /// Entity id
    pub id: String,
    /// Encoded entity
    pub value: Vec<u8>,
}

/// Id-keyed entity persistence
pub trait EntityStore {
    /// Encoded entity, if present
    fn get(&self, family: EntityFamily, id: &str) -> Result<Option<Vec<u8>>>;

    /// Apply all writes atomically
    fn write_batch(&self, writes: Vec<EntityWrite>) -> Result<()>;

    /// Ids of every stored entity of one family
    fn ids(&self, family: EntityFamily) -> Result<Vec<String>>;
}

/// RocksDB-backed entity store
pub struct Storage {
    db: Arc<DB>,
    path: PathBuf,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").field("path", &self.path).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Point updates of a small working set, mostly overwrites
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors: Vec<_> = EntityFamily::ALL
            .iter()
            .map(|family| ColumnFamilyDescriptor::new(family.cf_name(), Self::cf_options(*family)))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = EntityFamily::ALL.len(),
            "Opened RocksDB"
        );

        Ok(Self {
            db: Arc::new(db),
            path: path.clone(),
        })
    }

    fn cf_options(family: EntityFamily) -> Options {
        let mut opts = Options::default();
        if family.is_event_record() || family == EntityFamily::AccountCTokenTransaction {
            opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        } else {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            // Every handler starts with point lookups
            let mut block_opts = rocksdb::BlockBasedOptions::default();
            block_opts.set_bloom_filter(10.0, false);
            opts.set_block_based_table_factory(&block_opts);
        }
        opts
    }

    fn cf_handle(&self, family: EntityFamily) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(family.cf_name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", family.cf_name())))
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for family in EntityFamily::ALL {
            let cf = self.cf_handle(family)?;
            let count = self.approximate_count(cf)?;
            match family {
                EntityFamily::Market => stats.markets = count,
                EntityFamily::Account => stats.accounts = count,
                EntityFamily::AccountCToken => stats.positions = count,
                f if f.is_event_record() => stats.event_records += count,
                _ => {}
            }
        }
        Ok(stats)
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        self.db.flush()?;
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl EntityStore for Storage {
    fn get(&self, family: EntityFamily, id: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(family)?;
        Ok(self.db.get_cf(cf, id.as_bytes())?)
    }

    fn write_batch(&self, writes: Vec<EntityWrite>) -> Result<()> {
        let mut batch = WriteBatch::default();
        let count = writes.len();

        for write in &writes {
            let cf = self.cf_handle(write.family)?;
            batch.put_cf(cf, write.id.as_bytes(), &write.value);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(entities = count, "Batch committed");

        Ok(())
    }

    fn ids(&self, family: EntityFamily) -> Result<Vec<String>> {
        let cf = self.cf_handle(family)?;
        let mut ids = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let id = String::from_utf8(key.into_vec())
                .map_err(|e| Error::Storage(format!("Non UTF-8 key in {}: {}", family.cf_name(), e)))?;
            ids.push(id);
        }

        Ok(ids)
    }
}

/// Approximate storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub markets: u64,
    pub accounts: u64,
    pub positions: u64,
    pub event_records: u64,
}

/// In-memory entity store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(EntityFamily, String), Vec<u8>>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored entities of one family
    pub fn count(&self, family: EntityFamily) -> usize {
        self.entries.iter().filter(|entry| entry.key().0 == family).count()
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, family: EntityFamily, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(family, id.to_string()))
            .map(|value| value.value().clone()))
    }

    fn write_batch(&self, writes: Vec<EntityWrite>) -> Result<()> {
        for write in writes {
            self.entries.insert((write.family, write.id), write.value);
        }
        Ok(())
    }

    fn ids(&self, family: EntityFamily) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == family)
            .map(|entry| entry.key().1.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Account, Market};
    use crate::repository::Repository;
    use crate::types::Address;
    use crate::Config;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        for family in EntityFamily::ALL {
            assert!(storage.db.cf_handle(family.cf_name()).is_some());
        }
    }

    #[test]
    fn test_batch_write_and_get() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut repo = Repository::new(&storage);
        let mut market = Market::new(addr(1));
        market.cash = "1000.5".parse().unwrap();
        repo.save(&market).unwrap();
        repo.save(&Account { id: addr(2).to_hex() }).unwrap();
        repo.commit().unwrap();

        let repo = Repository::new(&storage);
        let loaded: Market = repo.require(&market.id).unwrap();
        assert_eq!(loaded, market);
        assert!(repo.exists::<Account>(&addr(2).to_hex()).unwrap());
        assert!(!repo.exists::<Account>(&addr(1).to_hex()).unwrap());
    }

    #[test]
    fn test_families_are_separate() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage
            .write_batch(vec![EntityWrite {
                family: EntityFamily::Account,
                id: "shared".to_string(),
                value: vec![1, 2, 3],
            }])
            .unwrap();

        assert!(storage.get(EntityFamily::Account, "shared").unwrap().is_some());
        assert!(storage.get(EntityFamily::Market, "shared").unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_entities() {
        let (config, _temp) = test_config();

        let storage = Storage::open(&config).unwrap();
        let mut repo = Repository::new(&storage);
        repo.save(&Market::new(addr(7))).unwrap();
        repo.commit().unwrap();
        storage.close().unwrap();

        let storage = Storage::open(&config).unwrap();
        let repo = Repository::new(&storage);
        assert!(repo.load::<Market>(&addr(7).to_hex()).unwrap().is_some());
    }

    #[test]
    fn test_ids_scan_one_family() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut repo = Repository::new(&storage);
        repo.save(&Market::new(addr(2))).unwrap();
        repo.save(&Market::new(addr(1))).unwrap();
        repo.save(&Account { id: addr(3).to_hex() }).unwrap();
        repo.commit().unwrap();

        assert_eq!(
            storage.ids(EntityFamily::Market).unwrap(),
            vec![addr(1).to_hex(), addr(2).to_hex()]
        );
        assert!(storage.ids(EntityFamily::StakingRewards).unwrap().is_empty());

        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        repo.save(&Market::new(addr(2))).unwrap();
        repo.save(&Market::new(addr(1))).unwrap();
        repo.commit().unwrap();
        assert_eq!(
            store.ids(EntityFamily::Market).unwrap(),
            vec![addr(1).to_hex(), addr(2).to_hex()]
        );
    }

    #[test]
    fn test_memory_store_count() {
        let store = MemoryStore::new();
        let mut repo = Repository::new(&store);
        repo.save(&Account { id: addr(1).to_hex() }).unwrap();
        repo.save(&Account { id: addr(2).to_hex() }).unwrap();
        repo.save(&Market::new(addr(3))).unwrap();
        repo.commit().unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.count(EntityFamily::Account), 2);
    }
}
