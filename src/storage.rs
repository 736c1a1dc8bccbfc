//! Key-value backends: RocksDB for production, an ordered map for tests.

use crate::common::config::{StorageBackend, StorageConfig};
use crate::common::traits::{KvStore, WriteOp};
use crate::errors::StorageError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::open(path, true)
    }

    pub fn open<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref())
            .map_err(|e| StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(Self { db: Arc::new(db), sync_writes })
    }
}

impl KvStore for OptimizedStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key).map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put(key, value) => batch.put(key, value),
                WriteOp::Delete(key) => batch.delete(key),
            }
        }
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts).map_err(StorageError::from)
    }
}

/// Ordered in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    rows: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".into()))?;
        Ok(rows.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".into()))?;
        Ok(rows
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::WriteFailed("memory store poisoned".into()))?;
        for op in ops {
            match op {
                WriteOp::Put(key, value) => {
                    rows.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Opens the backend named by the configuration.
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn KvStore>, StorageError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::RocksDb => {
            tracing::info!(data_dir = %config.data_dir, "opening rocksdb storage");
            Ok(Arc::new(OptimizedStorage::open(&config.data_dir, config.sync_writes)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &str) -> WriteOp {
        WriteOp::Put(key.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    fn exercise(store: &dyn KvStore) {
        store
            .write_batch(vec![put("user:1", "a"), put("user:12", "b"), put("wallet:1", "c")])
            .unwrap();

        let users = store.scan_prefix(b"user:").unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].0, b"user:1".to_vec());

        let exact = store.scan_prefix(b"user:1:").unwrap();
        assert!(exact.is_empty());

        store.write_batch(vec![WriteOp::Delete(b"user:1".to_vec())]).unwrap();
        assert_eq!(store.get(b"user:1").unwrap(), None);
        assert_eq!(store.get(b"wallet:1").unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn test_memory_storage_prefix_scan() {
        let store = MemoryStorage::new();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_rocksdb_storage_prefix_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = OptimizedStorage::open(dir.path(), false).unwrap();
        exercise(&store);
    }
}
