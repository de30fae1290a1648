pub mod layer;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use layer::{CacheLayer, DEFAULT_CHUNK_SIZE, DEFAULT_TTL_SECS};
pub use memory::{MemoryStore, DEFAULT_MAX_ENTRIES};
pub use redis_store::RedisStore;
pub use store::{KeyValueStore, StoreOp, TxOutcome, WatchGuard};
