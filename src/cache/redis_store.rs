//! [`KeyValueStore`] backed by a Redis server, shared by every process that
//! points at the same `cache.url`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use url::Url;

use super::store::{KeyValueStore, StoreOp, TxOutcome, WatchGuard};
use crate::error::CacheError;

pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    /// Connections holding an open WATCH, keyed by the guard they were issued for.
    pending: Mutex<FxHashMap<u64, MultiplexedConnection>>,
    next_watch: AtomicU64,
}

impl RedisStore {
    /// Connect to `url`, authenticating with `password` when given.
    pub async fn connect(url: &str, password: Option<&str>) -> Result<Self, CacheError> {
        let url = connection_url(url, password)?;
        let client = Client::open(url.as_str())?;
        let manager = ConnectionManager::new(client.clone()).await?;

        info!("Connected to redis at {}", redacted(&url));

        Ok(Self {
            client,
            manager,
            pending: Mutex::new(FxHashMap::default()),
            next_watch: AtomicU64::new(0),
        })
    }
}

fn connection_url(url: &str, password: Option<&str>) -> Result<Url, CacheError> {
    let mut parsed = Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "redis" | "rediss") {
        return Err(CacheError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            url,
            parsed.scheme()
        )));
    }
    if let Some(password) = password {
        parsed
            .set_password(Some(password))
            .map_err(|_| CacheError::InvalidUrl(format!("{}: cannot carry a password", url)))?;
    }
    Ok(parsed)
}

fn redacted(url: &Url) -> Url {
    let mut shown = url.clone();
    if shown.password().is_some() {
        let _ = shown.set_password(Some("***"));
    }
    shown
}

fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn index(position: usize) -> isize {
    isize::try_from(position).unwrap_or(isize::MAX)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let () = conn.set_ex(key, value, expiry_secs(ttl)).await?;
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<usize, CacheError> {
        let mut conn = self.manager.clone();
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn lrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, CacheError> {
        let mut conn = self.manager.clone();
        let items: Vec<String> = conn.lrange(key, index(start), index(stop)).await?;
        Ok(items)
    }

    async fn watch(&self, key: &str) -> Result<WatchGuard, CacheError> {
        // WATCH is connection state, so each transaction gets its own connection
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let () = redis::cmd("WATCH").arg(key).query_async(&mut conn).await?;

        let token = self.next_watch.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().await.insert(token, conn);

        Ok(WatchGuard {
            key: key.to_string(),
            version: token,
        })
    }

    async fn exec(&self, guard: WatchGuard, ops: Vec<StoreOp>) -> Result<TxOutcome, CacheError> {
        let mut conn = self.pending.lock().await.remove(&guard.version).ok_or_else(|| {
            CacheError::Store(format!("no open watch on {} (guard {})", guard.key, guard.version))
        })?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                StoreOp::Del(key) => {
                    pipe.del(key).ignore();
                },
                StoreOp::RPush(key, items) => {
                    if !items.is_empty() {
                        pipe.rpush(key, items).ignore();
                    }
                },
                StoreOp::Expire(key, ttl) => {
                    pipe.expire(key, expiry_secs(ttl) as i64).ignore();
                },
                StoreOp::SetEx(key, value, ttl) => {
                    pipe.set_ex(key, value, expiry_secs(ttl)).ignore();
                },
            }
        }

        // EXEC replies nil when a watched key changed
        let reply: Option<()> = pipe.query_async(&mut conn).await?;
        Ok(match reply {
            Some(()) => TxOutcome::Committed,
            None => TxOutcome::Aborted,
        })
    }
}
