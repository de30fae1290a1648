//! Error types for the metrics pipeline.
//!
//! The core never maps errors to transport codes itself. [`ErrorKind::status_code`]
//! exists for whatever sits at the outer boundary (HTTP handler, CLI).

use std::fmt;

/// Broad classification of a [`MetricsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed client input (start date, offsets).
    InvalidDate,
    /// Upstream returned nothing usable, or the data broke a classification invariant.
    UpstreamData,
    /// Cache store failure. Absorbed by the aggregator, never surfaced to callers.
    Cache,
}

impl ErrorKind {
    /// HTTP status equivalent, for use at the external boundary only.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidDate => 400,
            ErrorKind::UpstreamData => 502,
            ErrorKind::Cache => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidDate => "invalid_date",
            ErrorKind::UpstreamData => "upstream_data",
            ErrorKind::Cache => "cache",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("upstream data error: {0}")]
    UpstreamData(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl MetricsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::InvalidDate(_) => ErrorKind::InvalidDate,
            MetricsError::UpstreamData(_) => ErrorKind::UpstreamData,
            MetricsError::Cache(_) => ErrorKind::Cache,
        }
    }

    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        MetricsError::UpstreamData(message.into())
    }
}

/// Failures of the cache layer and the key-value store beneath it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid cache url: {0}")]
    InvalidUrl(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache transaction aborted: key {key} changed while being written")]
    TransactionAborted { key: String },
}

pub type Result<T, E = MetricsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_boundary_status_codes() {
        let invalid = MetricsError::InvalidDate("2023-13-01".into());
        let upstream = MetricsError::upstream("no data");
        let cache = MetricsError::from(CacheError::Store("connection refused".into()));

        assert_eq!(invalid.kind().status_code(), 400);
        assert_eq!(upstream.kind().status_code(), 502);
        assert_eq!(cache.kind(), ErrorKind::Cache);
    }

    #[test]
    fn cache_error_message_names_the_key() {
        let err = CacheError::TransactionAborted {
            key: "paginated/metrics:{}".into(),
        };
        assert!(err.to_string().contains("paginated/metrics:{}"));
    }
}
