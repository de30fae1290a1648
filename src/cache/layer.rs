use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::store::{KeyValueStore, StoreOp, TxOutcome};
use crate::config::CacheSettings;
use crate::error::CacheError;

/// Default entry lifetime: one hour.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Items per list push or range call.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Suffix of the scalar key holding a list's write generation.
const GENERATION_SUFFIX: &str = "#generation";

static GENERATION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generation_key(key: &str) -> String {
    format!("{}{}", key, GENERATION_SUFFIX)
}

/// Token unique to one list write, across processes sharing a store.
fn next_generation() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!(
        "{}-{}-{}",
        std::process::id(),
        nanos,
        GENERATION_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Read-through/write-through result cache over a [`KeyValueStore`].
///
/// Scalars are stored as one JSON string; lists as a store list with one JSON
/// item per element. The cache is never a source of truth: every method
/// returns its failure and the caller decides to recompute.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn KeyValueStore>,
    chunk_size: usize,
    ttl: Duration,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: &CacheSettings) -> Self {
        Self::with_options(
            store,
            settings.chunk_size,
            Duration::from_secs(settings.ttl_secs),
        )
    }

    pub fn with_options(store: Arc<dyn KeyValueStore>, chunk_size: usize, ttl: Duration) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Cache key for `operation` called with `input`.
    ///
    /// Object keys are sorted so that inputs differing only in field order share a key.
    pub fn key<I>(operation: &str, input: &I) -> Result<String, CacheError>
    where
        I: Serialize + ?Sized,
    {
        let value = serde_json::to_value(input)?;
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical)?;
        Ok(format!("{}:{}", operation, canonical))
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.store.set_ex(key, raw, ttl).await
    }

    /// Read a cached list in chunks.
    ///
    /// The list's generation marker is read before and after the chunks. A
    /// missing marker, a marker that changed during the read (a concurrent
    /// rewrite), a short chunk or an empty list is reported as a miss.
    pub async fn get_list<T>(&self, key: &str) -> Result<Option<Vec<T>>, CacheError>
    where
        T: DeserializeOwned,
    {
        let marker = generation_key(key);
        let Some(generation) = self.store.get(&marker).await? else {
            return Ok(None);
        };

        let len = self.store.llen(key).await?;
        if len == 0 {
            return Ok(None);
        }

        let mut raw_items = Vec::with_capacity(len);
        let mut start = 0;
        while start < len {
            let stop = (start + self.chunk_size).min(len) - 1;
            let chunk = self.store.lrange(key, start, stop).await?;

            if chunk.len() != stop - start + 1 {
                debug!(
                    "Partial read of {} ({} of {} items at offset {}), treating as miss",
                    key,
                    chunk.len(),
                    stop - start + 1,
                    start
                );
                return Ok(None);
            }

            raw_items.extend(chunk);
            start = stop + 1;
        }

        if self.store.get(&marker).await?.as_deref() != Some(generation.as_str()) {
            debug!("{} was rewritten while being read, treating as miss", key);
            return Ok(None);
        }

        let items = raw_items
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Some(items))
    }

    /// Replace the list at `key` in one optimistic transaction.
    ///
    /// Watches the key, then deletes it, pushes every chunk, sets the TTL and
    /// stamps a fresh generation marker. If another writer touched the key in
    /// between, nothing is applied and [`CacheError::TransactionAborted`] is
    /// returned. There is no retry.
    pub async fn set_list<T>(&self, key: &str, items: &[T], ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let mut ops = Vec::with_capacity(items.len() / self.chunk_size + 4);
        ops.push(StoreOp::Del(key.to_string()));
        for chunk in items.chunks(self.chunk_size) {
            let encoded = chunk
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<String>, _>>()?;
            ops.push(StoreOp::RPush(key.to_string(), encoded));
        }
        ops.push(StoreOp::Expire(key.to_string(), ttl));
        ops.push(StoreOp::SetEx(generation_key(key), next_generation(), ttl));

        let guard = self.store.watch(key).await?;
        match self.store.exec(guard, ops).await? {
            TxOutcome::Committed => {
                debug!("Cached {} items under {}", items.len(), key);
                Ok(())
            },
            TxOutcome::Aborted => Err(CacheError::TransactionAborted {
                key: key.to_string(),
            }),
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), CacheError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        },
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}
