//! Upstream query capability.
//!
//! The subgraph gateway is an external collaborator: it answers a named
//! operation with `{ data?, error? }`, where `data` is a JSON object keyed by
//! source name holding that source's record array. Every call is capped at
//! roughly 1000 rows, which is why callers query in date windows.

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MetricsError;
use crate::models::SourceRecords;

pub mod http;

pub use http::HttpUpstream;

// ============================================
// Operation names
// ============================================

pub const TOKEN_RECORDS: &str = "tokenRecords";
pub const TOKEN_SUPPLIES: &str = "tokenSupplies";
pub const PROTOCOL_METRICS: &str = "protocolMetrics";

pub const LATEST_TOKEN_RECORDS: &str = "latest/tokenRecords";
pub const LATEST_TOKEN_SUPPLIES: &str = "latest/tokenSupplies";
pub const LATEST_PROTOCOL_METRICS: &str = "latest/protocolMetrics";

pub const EARLIEST_TOKEN_RECORDS: &str = "earliest/tokenRecords";
pub const EARLIEST_TOKEN_SUPPLIES: &str = "earliest/tokenSupplies";
pub const EARLIEST_PROTOCOL_METRICS: &str = "earliest/protocolMetrics";

/// Raw reply of one upstream operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn query(&self, operation: &str, input: &Value) -> Result<QueryResponse, MetricsError>;
}

/// Run `operation` and decode its per-source record arrays.
///
/// An upstream error, a missing `data` payload, or a payload that does not
/// decode are all reported as [`MetricsError::UpstreamData`].
pub async fn fetch_source_records<T>(
    upstream: &dyn Upstream,
    operation: &str,
    input: &Value,
) -> Result<SourceRecords<T>, MetricsError>
where
    T: DeserializeOwned,
{
    let response = upstream.query(operation, input).await?;

    if let Some(error) = response.error {
        return Err(MetricsError::upstream(format!(
            "{} failed for input {}: {}",
            operation, input, error
        )));
    }

    let data = response.data.ok_or_else(|| {
        MetricsError::upstream(format!("{} returned no data for input {}", operation, input))
    })?;

    let records: SourceRecords<T> = serde_json::from_value(data).map_err(|e| {
        MetricsError::upstream(format!("{} returned malformed records: {}", operation, e))
    })?;

    debug!(
        "{} returned {} records across {} sources",
        operation,
        records.values().map(Vec::len).sum::<usize>(),
        records.len()
    );

    Ok(records)
}
