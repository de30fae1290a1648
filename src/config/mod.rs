#[allow(clippy::module_inception)]
mod config;

pub use config::{
    CacheSettings, CompletenessSettings, PaginationSettings, Settings, TokenSettings,
    UpstreamSettings, WarmerSettings,
};
