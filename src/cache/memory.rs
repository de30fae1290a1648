//! In-process [`KeyValueStore`] on a bounded moka cache.
//!
//! Entries carry their own deadline and are evicted by moka once it passes,
//! whether or not they are read again. Every write is stamped with a version
//! from a single counter; a watch compares the key's version at exec time
//! with the one it saw.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

use super::store::{wrong_type, KeyValueStore, StoreOp, TxOutcome, WatchGuard};
use crate::error::CacheError;

/// Default bound on live keys.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// How long a deleted key's version is remembered for watchers.
const TOMBSTONE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
    version: u64,
}

impl Slot {
    fn new(value: Value, expires_at: Option<Instant>) -> Self {
        Self {
            value,
            expires_at,
            version: 0,
        }
    }
}

/// Expires each slot at its own deadline.
struct SlotExpiry;

impl Expiry<String, Arc<Slot>> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &Arc<Slot>,
        created_at: Instant,
    ) -> Option<Duration> {
        slot.expires_at
            .map(|at| at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Arc<Slot>,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        slot.expires_at
            .map(|at| at.saturating_duration_since(updated_at))
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

pub struct MemoryStore {
    slots: Cache<String, Arc<Slot>>,
    /// Version at which recently deleted keys disappeared.
    tombstones: Cache<String, u64>,
    /// Serializes writers; holds the last version handed out.
    version: Mutex<u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            slots: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(SlotExpiry)
                .build(),
            tombstones: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(TOMBSTONE_TTL)
                .build(),
            version: Mutex::new(0),
        }
    }

    /// Number of live keys, after flushing pending evictions.
    pub async fn len(&self) -> u64 {
        self.slots.run_pending_tasks().await;
        self.slots.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn key_version(&self, key: &str) -> u64 {
        let live = self.slots.get(key).await.map_or(0, |slot| slot.version);
        let deleted = self.tombstones.get(key).await.unwrap_or(0);
        live.max(deleted)
    }

    /// Current state of `key` inside a transaction: staged if touched, else live.
    async fn take_current(
        &self,
        staged: &mut FxHashMap<String, Option<Slot>>,
        key: &str,
    ) -> Option<Slot> {
        match staged.remove(key) {
            Some(slot) => slot,
            None => self.slots.get(key).await.map(|slot| Slot::clone(&slot)),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.slots.get(key).await {
            Some(slot) => match &slot.value {
                Value::Text(text) => Ok(Some(text.clone())),
                Value::List(_) => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut version = self.version.lock().await;
        *version += 1;

        let mut slot = Slot::new(Value::Text(value), deadline(ttl));
        slot.version = *version;
        self.slots.insert(key.to_string(), Arc::new(slot)).await;
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<usize, CacheError> {
        match self.slots.get(key).await {
            Some(slot) => match &slot.value {
                Value::List(list) => Ok(list.len()),
                Value::Text(_) => Err(wrong_type(key)),
            },
            None => Ok(0),
        }
    }

    async fn lrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, CacheError> {
        match self.slots.get(key).await {
            Some(slot) => match &slot.value {
                Value::List(list) => {
                    if start >= list.len() || start > stop {
                        return Ok(Vec::new());
                    }
                    let end = stop.min(list.len() - 1);
                    Ok(list[start..=end].to_vec())
                },
                Value::Text(_) => Err(wrong_type(key)),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn watch(&self, key: &str) -> Result<WatchGuard, CacheError> {
        let _writers = self.version.lock().await;
        Ok(WatchGuard {
            key: key.to_string(),
            version: self.key_version(key).await,
        })
    }

    async fn exec(&self, guard: WatchGuard, ops: Vec<StoreOp>) -> Result<TxOutcome, CacheError> {
        let mut version = self.version.lock().await;
        if self.key_version(&guard.key).await != guard.version {
            return Ok(TxOutcome::Aborted);
        }

        // Resolve every op before writing so a type error applies nothing.
        let mut staged: FxHashMap<String, Option<Slot>> = FxHashMap::default();
        for op in ops {
            match op {
                StoreOp::Del(key) => {
                    staged.insert(key, None);
                },
                StoreOp::RPush(key, items) => {
                    let slot = match self.take_current(&mut staged, &key).await {
                        Some(Slot {
                            value: Value::List(mut list),
                            expires_at,
                            ..
                        }) => {
                            list.extend(items);
                            Slot::new(Value::List(list), expires_at)
                        },
                        Some(_) => return Err(wrong_type(&key)),
                        None => Slot::new(Value::List(items), None),
                    };
                    staged.insert(key, Some(slot));
                },
                StoreOp::Expire(key, ttl) => {
                    let touched = staged.contains_key(&key);
                    match self.take_current(&mut staged, &key).await {
                        Some(mut slot) => {
                            slot.expires_at = deadline(ttl);
                            staged.insert(key, Some(slot));
                        },
                        None if touched => {
                            staged.insert(key, None);
                        },
                        None => {},
                    }
                },
                StoreOp::SetEx(key, value, ttl) => {
                    staged.insert(key, Some(Slot::new(Value::Text(value), deadline(ttl))));
                },
            }
        }

        for (key, slot) in staged {
            *version += 1;
            match slot {
                Some(mut slot) => {
                    slot.version = *version;
                    self.slots.insert(key, Arc::new(slot)).await;
                },
                None => {
                    self.slots.invalidate(&key).await;
                    self.tombstones.insert(key, *version).await;
                },
            }
        }

        Ok(TxOutcome::Committed)
    }
}
