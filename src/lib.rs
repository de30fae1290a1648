pub mod cache;
pub mod config;
pub mod cron;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod upstream;
pub mod utils;

pub use cache::{CacheLayer, KeyValueStore, MemoryStore, RedisStore};
pub use config::Settings;
pub use cron::CronScheduler;
pub use error::{CacheError, ErrorKind, MetricsError};
pub use models::{Blockchain, Metric};
pub use pipeline::{Aggregator, MetricsQuery, RecordsQuery, SnapshotQuery};
pub use upstream::{HttpUpstream, Upstream};
