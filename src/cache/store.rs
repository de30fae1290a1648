//! Key-value store seam used by the cache layer.
//!
//! The interface mirrors the small subset of a networked key-value server the
//! cache needs: string get/set with expiry, list push/range/length, and a
//! watch-based optimistic transaction.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Token returned by [`KeyValueStore::watch`]. The transaction commits only if
/// the key has not been modified since the watch was taken.
///
/// `version` is opaque and only meaningful to the store that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchGuard {
    pub key: String,
    pub version: u64,
}

/// One queued command of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Del(String),
    RPush(String, Vec<String>),
    Expire(String, Duration),
    SetEx(String, String, Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    /// A watched key changed; nothing was applied.
    Aborted,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Length of the list at `key`; zero when absent.
    async fn llen(&self, key: &str) -> Result<usize, CacheError>;

    /// Items `start..=stop` of the list at `key`, clamped to its length.
    async fn lrange(&self, key: &str, start: usize, stop: usize)
        -> Result<Vec<String>, CacheError>;

    async fn watch(&self, key: &str) -> Result<WatchGuard, CacheError>;

    /// Apply `ops` atomically unless the watched key changed.
    async fn exec(&self, guard: WatchGuard, ops: Vec<StoreOp>) -> Result<TxOutcome, CacheError>;
}

pub(crate) fn wrong_type(key: &str) -> CacheError {
    CacheError::Store(format!("WRONGTYPE operation against key {} holding the wrong kind of value", key))
}
