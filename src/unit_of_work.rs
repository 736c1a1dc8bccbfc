//! Explicit transactional handle over the key-value store
//!
//! A [`UnitOfWork`] is opened with the set of row locks it needs, buffers its writes,
//! serves its own writes back on read, and applies everything in one atomic batch on
//! [`UnitOfWork::commit`]. Dropping it without committing discards the staged writes.
//! Locks are released when the unit is dropped or committed.
//!
//! Locks are per user (plus a few named job locks). A unit that needs several locks
//! takes them in ascending [`LockKey`] order, so two units can never wait on each other.

use crate::common::traits::{KvStore, WriteOp};
use crate::common::types::UserId;
use crate::errors::StorageError;
use crate::storage::MemoryStorage;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Name of a mutual-exclusion domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    User(UserId),
    Job(&'static str),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::User(id) => write!(f, "user:{}", id),
            LockKey::Job(name) => write!(f, "job:{}", name),
        }
    }
}

#[derive(Default)]
struct LockTable {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockTable {
    async fn acquire(&self, keys: &BTreeSet<LockKey>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(keys.len());
        // BTreeSet iterates in ascending order
        for key in keys {
            let lock = self.locks.entry(key.clone()).or_default().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// Shared handle to the backend plus its lock table.
#[derive(Clone)]
pub struct Store {
    kv: Arc<dyn KvStore>,
    locks: Arc<LockTable>,
}

impl Store {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv, locks: Arc::new(LockTable::default()) }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Opens a unit holding the locks of every listed user.
    pub async fn begin(&self, users: &[UserId]) -> UnitOfWork {
        self.begin_with(users.iter().copied().map(LockKey::User)).await
    }

    pub async fn begin_with<I: IntoIterator<Item = LockKey>>(&self, keys: I) -> UnitOfWork {
        let held: BTreeSet<LockKey> = keys.into_iter().collect();
        let guards = self.locks.acquire(&held).await;
        UnitOfWork {
            kv: self.kv.clone(),
            held,
            _guards: guards,
            staged: BTreeMap::new(),
        }
    }

    /// Lock-free unit for reads. Committing it is allowed but it cannot pass
    /// [`UnitOfWork::require_lock`].
    pub fn reader(&self) -> UnitOfWork {
        UnitOfWork {
            kv: self.kv.clone(),
            held: BTreeSet::new(),
            _guards: Vec::new(),
            staged: BTreeMap::new(),
        }
    }
}

pub struct UnitOfWork {
    kv: Arc<dyn KvStore>,
    held: BTreeSet<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl UnitOfWork {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.staged.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.kv.get(key),
        }
    }

    /// Prefix scan over committed rows overlaid with this unit's staged writes.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows: BTreeMap<Vec<u8>, Vec<u8>> = self.kv.scan_prefix(prefix)?.into_iter().collect();
        for (key, staged) in self.staged.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match staged {
                Some(value) => rows.insert(key.clone(), value.clone()),
                None => rows.remove(key),
            };
        }
        Ok(rows.into_iter().collect())
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.staged.insert(key, None);
    }

    pub fn holds(&self, key: &LockKey) -> bool {
        self.held.contains(key)
    }

    /// Fails unless this unit was opened with the user's lock.
    pub fn require_lock(&self, user_id: UserId) -> Result<(), StorageError> {
        let key = LockKey::User(user_id);
        if self.holds(&key) {
            Ok(())
        } else {
            Err(StorageError::LockNotHeld(key.to_string()))
        }
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Applies every staged write atomically, then releases the locks.
    pub fn commit(self) -> Result<(), StorageError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let ops = self
            .staged
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => WriteOp::Put(key, value),
                None => WriteOp::Delete(key),
            })
            .collect();
        self.kv.write_batch(ops)
    }
}
