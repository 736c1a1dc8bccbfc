//! Shared traits at the seams of the core
//!
//! Storage, time and the outbound result channel are injected through these traits so
//! every component can be exercised with in-memory doubles.

use crate::bets::Settlement;
use crate::errors::StorageError;
use crate::games::crash::Multiplier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One staged mutation in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl WriteOp {
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put(key, _) | WriteOp::Delete(key) => key,
        }
    }
}

/// Ordered byte-keyed store. Batches are applied atomically.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError>;
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Receives live crash-round events for the chat transport to render.
#[async_trait]
pub trait RoundObserver: Send + Sync {
    /// The multiplier advanced and the round is still open.
    async fn on_tick(&self, round_id: Uuid, multiplier: Multiplier);

    /// The round ended, by cash-out or by crashing.
    async fn on_settled(&self, round_id: Uuid, settlement: &Settlement);
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

#[async_trait]
impl RoundObserver for SilentObserver {
    async fn on_tick(&self, _round_id: Uuid, _multiplier: Multiplier) {}

    async fn on_settled(&self, _round_id: Uuid, _settlement: &Settlement) {}
}
