use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cache::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};
use crate::models::Blockchain;
use crate::pipeline::completeness::CompletenessFilter;
use crate::pipeline::paginator::DEFAULT_OFFSET_DAYS;
use crate::pipeline::supply::{TokenIdentities, DEFAULT_NATIVE_TOKENS, DEFAULT_WRAPPED_TOKENS};

/// Subgraph gateway connection.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub url: String,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

/// Result cache behaviour.
///
/// Lists are written and read in chunks of `chunk_size` items so that no
/// single store call exceeds the transport's request size limit.
///
/// With `url` set the cache lives in Redis and is shared between processes;
/// otherwise it is kept in process, bounded to `max_entries` keys.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            chunk_size: default_cache_chunk_size(),
            url: None,
            password: None,
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_cache_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Window width for backward pagination.
#[derive(Debug, Deserialize, Clone)]
pub struct PaginationSettings {
    #[serde(default = "default_offset_days")]
    pub offset_days: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            offset_days: default_offset_days(),
        }
    }
}

fn default_offset_days() -> u64 {
    DEFAULT_OFFSET_DAYS
}

/// Native and index-wrapped token addresses recognized by supply classification.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    #[serde(default = "default_native_tokens")]
    pub native: Vec<String>,
    #[serde(default = "default_wrapped_tokens")]
    pub wrapped: Vec<String>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            native: default_native_tokens(),
            wrapped: default_wrapped_tokens(),
        }
    }
}

fn default_native_tokens() -> Vec<String> {
    DEFAULT_NATIVE_TOKENS.iter().map(|s| s.to_string()).collect()
}

fn default_wrapped_tokens() -> Vec<String> {
    DEFAULT_WRAPPED_TOKENS.iter().map(|s| s.to_string()).collect()
}

/// Reference sources for cross-chain completeness trimming.
#[derive(Debug, Deserialize, Clone)]
pub struct CompletenessSettings {
    #[serde(default = "default_primary_source")]
    pub primary: Blockchain,
    #[serde(default = "default_secondary_source")]
    pub secondary: Blockchain,
}

impl Default for CompletenessSettings {
    fn default() -> Self {
        Self {
            primary: default_primary_source(),
            secondary: default_secondary_source(),
        }
    }
}

fn default_primary_source() -> Blockchain {
    Blockchain::Ethereum
}

fn default_secondary_source() -> Blockchain {
    Blockchain::Arbitrum
}

/// Background cache warming.
#[derive(Debug, Deserialize, Clone)]
pub struct WarmerSettings {
    #[serde(default = "default_warmer_enabled")]
    pub enabled: bool,
    #[serde(default = "default_warmer_interval_secs")]
    pub interval_secs: u64,
    /// Fixed start date for the warmed range. When unset, `lookback_days` before today.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default = "default_warmer_lookback_days")]
    pub lookback_days: u64,
    #[serde(default)]
    pub cross_chain_data_complete: bool,
}

impl Default for WarmerSettings {
    fn default() -> Self {
        Self {
            enabled: default_warmer_enabled(),
            interval_secs: default_warmer_interval_secs(),
            start_date: None,
            lookback_days: default_warmer_lookback_days(),
            cross_chain_data_complete: false,
        }
    }
}

fn default_warmer_enabled() -> bool {
    true
}

fn default_warmer_interval_secs() -> u64 {
    900 // 15 minutes, well inside the cache TTL
}

fn default_warmer_lookback_days() -> u64 {
    30
}

/// Root application configuration.
///
/// Loaded from an optional `config.{yaml,toml,json}` file, then overridden by
/// `METRICS__SECTION__KEY` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub pagination: PaginationSettings,
    #[serde(default)]
    pub tokens: TokenSettings,
    #[serde(default)]
    pub completeness: CompletenessSettings,
    #[serde(default)]
    pub warmer: WarmerSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("METRICS").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    pub fn token_identities(&self) -> TokenIdentities {
        TokenIdentities::new(&self.tokens.native, &self.tokens.wrapped)
    }

    pub fn completeness_filter(&self) -> CompletenessFilter {
        CompletenessFilter::new(self.completeness.primary, self.completeness.secondary)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load(yaml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings = load("upstream:\n  url: https://gateway.example.com\n").unwrap();

        assert_eq!(settings.upstream.timeout_secs, 60);
        assert_eq!(settings.cache.ttl_secs, 3600);
        assert_eq!(settings.cache.chunk_size, 1000);
        assert_eq!(settings.cache.url, None);
        assert_eq!(settings.cache.max_entries, 10_000);
        assert_eq!(settings.pagination.offset_days, 10);
        assert_eq!(settings.completeness.primary, Blockchain::Ethereum);
        assert_eq!(settings.completeness.secondary, Blockchain::Arbitrum);
        assert!(settings.warmer.enabled);
        assert!(settings
            .token_identities()
            .is_wrapped("0x0ab87046fbb341d058f17cbc4c1133f25a20a52f"));
    }

    #[test]
    fn test_overrides() {
        let yaml = r#"
upstream:
  url: https://gateway.example.com
cache:
  ttl_secs: 60
  chunk_size: 250
completeness:
  primary: Arbitrum
  secondary: Base
tokens:
  native: ["0xAAAA"]
  wrapped: []
"#;
        let settings = load(yaml).unwrap();

        assert_eq!(settings.cache_ttl(), Duration::from_secs(60));
        assert_eq!(settings.cache.chunk_size, 250);
        assert_eq!(
            settings.completeness_filter().sources(),
            (Blockchain::Arbitrum, Blockchain::Base)
        );
        let identities = settings.token_identities();
        assert!(identities.is_native("0xaaaa"));
        assert!(!identities.is_wrapped("0x0ab87046fbb341d058f17cbc4c1133f25a20a52f"));
    }

    #[test]
    fn test_shared_cache_settings() {
        let yaml = r#"
upstream:
  url: https://gateway.example.com
cache:
  url: redis://cache.internal:6379
  password: s3cret
  max_entries: 500
"#;
        let settings = load(yaml).unwrap();

        assert_eq!(settings.cache.url.as_deref(), Some("redis://cache.internal:6379"));
        assert_eq!(settings.cache.password.as_deref(), Some("s3cret"));
        assert_eq!(settings.cache.max_entries, 500);
        assert_eq!(settings.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_missing_upstream_is_an_error() {
        assert!(load("cache:\n  ttl_secs: 10\n").is_err());
    }
}
