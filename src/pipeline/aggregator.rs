//! Top-level aggregation entry points.
//!
//! Each operation validates its input, consults the cache, and on a miss
//! walks the requested date range window by window, normalizes the per-source
//! results and writes the outcome back. Cache failures never fail a request;
//! they are logged and the result is recomputed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::completeness::{trim_to_cutoff, CompletenessFilter};
use super::composer::{ComposeOptions, MetricComposer};
use super::normalizer::{flatten_records, NormalizeOptions};
use super::paginator::{DateWindowPaginator, DEFAULT_OFFSET_DAYS};
use super::supply::SupplyClassifier;
use crate::cache::{CacheLayer, KeyValueStore};
use crate::config::Settings;
use crate::error::MetricsError;
use crate::models::{
    group_by_date, Metric, ProtocolMetric, SourceRecord, SourceRecords, TokenRecord, TokenSupply,
};
use crate::upstream::{self, fetch_source_records, Upstream};
use crate::utils::format_date;

// ============================================
// Cache operation names
// ============================================

pub const PAGINATED_TOKEN_RECORDS: &str = "paginated/tokenRecords";
pub const PAGINATED_TOKEN_SUPPLIES: &str = "paginated/tokenSupplies";
pub const PAGINATED_PROTOCOL_METRICS: &str = "paginated/protocolMetrics";
pub const PAGINATED_METRICS: &str = "paginated/metrics";
pub const LATEST_METRIC: &str = "latest/metrics";
pub const EARLIEST_METRIC: &str = "earliest/metrics";

/// Input of the paginated record operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQuery {
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_offset: Option<u64>,
    #[serde(default)]
    pub cross_chain_data_complete: bool,
    /// Bypass the cache read. The fresh result is still written back.
    #[serde(default, skip_serializing)]
    pub ignore_cache: bool,
}

/// Input of [`Aggregator::paginated_metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_offset: Option<u64>,
    #[serde(default)]
    pub cross_chain_data_complete: bool,
    #[serde(default)]
    pub include_records: bool,
    #[serde(default, skip_serializing)]
    pub ignore_cache: bool,
}

/// Input of the latest/earliest metric operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotQuery {
    #[serde(default)]
    pub include_records: bool,
    #[serde(default, skip_serializing)]
    pub ignore_cache: bool,
}

pub struct Aggregator {
    upstream: Arc<dyn Upstream>,
    cache: Option<CacheLayer>,
    composer: MetricComposer,
    completeness: CompletenessFilter,
    offset_days: u64,
}

impl Aggregator {
    pub fn new(upstream: Arc<dyn Upstream>, composer: MetricComposer) -> Self {
        Self {
            upstream,
            cache: None,
            composer,
            completeness: CompletenessFilter::default(),
            offset_days: DEFAULT_OFFSET_DAYS,
        }
    }

    /// Wire an aggregator from configuration, caching into `store`.
    pub fn from_settings(
        settings: &Settings,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let composer = MetricComposer::new(SupplyClassifier::new(settings.token_identities()));

        Self::new(upstream, composer)
            .with_cache(CacheLayer::new(store, &settings.cache))
            .with_completeness(settings.completeness_filter())
            .with_offset_days(settings.pagination.offset_days)
    }

    pub fn with_cache(mut self, cache: CacheLayer) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_completeness(mut self, completeness: CompletenessFilter) -> Self {
        self.completeness = completeness;
        self
    }

    /// Window width used when a query carries no `date_offset`.
    pub fn with_offset_days(mut self, offset_days: u64) -> Self {
        self.offset_days = offset_days;
        self
    }

    pub fn cache(&self) -> Option<&CacheLayer> {
        self.cache.as_ref()
    }

    pub async fn paginated_token_records(
        &self,
        query: &RecordsQuery,
    ) -> Result<Vec<TokenRecord>, MetricsError> {
        self.paginated_records(PAGINATED_TOKEN_RECORDS, upstream::TOKEN_RECORDS, query)
            .await
    }

    pub async fn paginated_token_supplies(
        &self,
        query: &RecordsQuery,
    ) -> Result<Vec<TokenSupply>, MetricsError> {
        self.paginated_records(PAGINATED_TOKEN_SUPPLIES, upstream::TOKEN_SUPPLIES, query)
            .await
    }

    pub async fn paginated_protocol_metrics(
        &self,
        query: &RecordsQuery,
    ) -> Result<Vec<ProtocolMetric>, MetricsError> {
        self.paginated_records(PAGINATED_PROTOCOL_METRICS, upstream::PROTOCOL_METRICS, query)
            .await
    }

    /// One metric per complete day from `start_date` through today, newest first.
    ///
    /// Days missing any record kind are skipped. A classification failure on
    /// any day fails the whole call.
    pub async fn paginated_metrics(&self, query: &MetricsQuery) -> Result<Vec<Metric>, MetricsError> {
        let paginator = self.paginator(&query.start_date, query.date_offset)?;

        let key = self.cache_key(PAGINATED_METRICS, query);
        if let Some(metrics) = self.read_list(key.as_deref(), query.ignore_cache).await {
            return Ok(metrics);
        }

        let token_records: SourceRecords<TokenRecord> =
            self.fetch_windows(upstream::TOKEN_RECORDS, &paginator).await?;
        let token_supplies: SourceRecords<TokenSupply> =
            self.fetch_windows(upstream::TOKEN_SUPPLIES, &paginator).await?;
        let protocol_metrics: SourceRecords<ProtocolMetric> =
            self.fetch_windows(upstream::PROTOCOL_METRICS, &paginator).await?;

        let metrics = self.build_daily_metrics(
            token_records,
            token_supplies,
            protocol_metrics,
            query.cross_chain_data_complete,
            ComposeOptions {
                include_records: query.include_records,
            },
        )?;

        info!(
            "Computed {} metrics from {} ({} windows)",
            metrics.len(),
            query.start_date,
            paginator.windows().count()
        );

        self.write_list(key.as_deref(), &metrics).await;
        Ok(metrics)
    }

    /// Metric built from each source's most recent snapshot.
    pub async fn latest_metric(&self, query: &SnapshotQuery) -> Result<Metric, MetricsError> {
        self.snapshot_metric(
            LATEST_METRIC,
            [
                upstream::LATEST_TOKEN_RECORDS,
                upstream::LATEST_TOKEN_SUPPLIES,
                upstream::LATEST_PROTOCOL_METRICS,
            ],
            query,
        )
        .await
    }

    /// Metric built from each source's first snapshot.
    pub async fn earliest_metric(&self, query: &SnapshotQuery) -> Result<Metric, MetricsError> {
        self.snapshot_metric(
            EARLIEST_METRIC,
            [
                upstream::EARLIEST_TOKEN_RECORDS,
                upstream::EARLIEST_TOKEN_SUPPLIES,
                upstream::EARLIEST_PROTOCOL_METRICS,
            ],
            query,
        )
        .await
    }

    async fn paginated_records<T>(
        &self,
        cache_operation: &str,
        upstream_operation: &str,
        query: &RecordsQuery,
    ) -> Result<Vec<T>, MetricsError>
    where
        T: SourceRecord + Serialize + DeserializeOwned + Send,
    {
        let paginator = self.paginator(&query.start_date, query.date_offset)?;

        let key = self.cache_key(cache_operation, query);
        if let Some(records) = self.read_list(key.as_deref(), query.ignore_cache).await {
            return Ok(records);
        }

        let sources: SourceRecords<T> = self.fetch_windows(upstream_operation, &paginator).await?;
        let sources = if query.cross_chain_data_complete {
            self.completeness.apply(sources)
        } else {
            sources
        };

        let mut records = flatten_records(sources, NormalizeOptions::default());
        // Stable, so source order is kept within a day
        records.sort_by(|a, b| b.date().cmp(&a.date()));

        self.write_list(key.as_deref(), &records).await;
        Ok(records)
    }

    async fn snapshot_metric(
        &self,
        cache_operation: &str,
        [records_operation, supplies_operation, metrics_operation]: [&str; 3],
        query: &SnapshotQuery,
    ) -> Result<Metric, MetricsError> {
        let key = self.cache_key(cache_operation, query);
        if let Some(metric) = self.read_value(key.as_deref(), query.ignore_cache).await {
            return Ok(metric);
        }

        let input = json!({});
        let upstream = self.upstream.as_ref();
        let token_records: SourceRecords<TokenRecord> =
            fetch_source_records(upstream, records_operation, &input).await?;
        let token_supplies: SourceRecords<TokenSupply> =
            fetch_source_records(upstream, supplies_operation, &input).await?;
        let protocol_metrics: SourceRecords<ProtocolMetric> =
            fetch_source_records(upstream, metrics_operation, &input).await?;

        let options = NormalizeOptions::default();
        let token_records = flatten_records(token_records, options);
        let token_supplies = flatten_records(token_supplies, options);
        let mut protocol_metrics = flatten_records(protocol_metrics, options);
        self.primary_first(&mut protocol_metrics);

        let metric = self.composer.compose(
            &token_records,
            &token_supplies,
            &protocol_metrics,
            ComposeOptions {
                include_records: query.include_records,
            },
        )?;

        self.write_value(key.as_deref(), &metric).await;
        Ok(metric)
    }

    fn paginator(
        &self,
        start_date: &str,
        date_offset: Option<u64>,
    ) -> Result<DateWindowPaginator, MetricsError> {
        DateWindowPaginator::from_start_date(start_date, Some(date_offset.unwrap_or(self.offset_days)))
    }

    /// Query `operation` once per window, strictly in sequence, and merge the
    /// per-source results.
    async fn fetch_windows<T>(
        &self,
        operation: &str,
        paginator: &DateWindowPaginator,
    ) -> Result<SourceRecords<T>, MetricsError>
    where
        T: DeserializeOwned + Send,
    {
        let mut accumulated: SourceRecords<T> = BTreeMap::new();

        for window in paginator {
            let input = json!({
                "startDate": format_date(window.start),
                "endDate": format_date(window.end),
            });

            let records: SourceRecords<T> =
                fetch_source_records(self.upstream.as_ref(), operation, &input).await?;

            for (blockchain, mut items) in records {
                accumulated.entry(blockchain).or_default().append(&mut items);
            }
        }

        Ok(accumulated)
    }

    fn build_daily_metrics(
        &self,
        token_records: SourceRecords<TokenRecord>,
        token_supplies: SourceRecords<TokenSupply>,
        protocol_metrics: SourceRecords<ProtocolMetric>,
        cross_chain_data_complete: bool,
        compose_options: ComposeOptions,
    ) -> Result<Vec<Metric>, MetricsError> {
        let (token_records, token_supplies, protocol_metrics) = if cross_chain_data_complete {
            let cutoff = earliest_cutoff(
                self.completeness.latest_complete_date(&token_records),
                self.completeness.latest_complete_date(&token_supplies),
            );
            debug!("Trimming metrics input to {:?}", cutoff);
            (
                trim_to_cutoff(token_records, cutoff),
                trim_to_cutoff(token_supplies, cutoff),
                trim_to_cutoff(protocol_metrics, cutoff),
            )
        } else {
            (token_records, token_supplies, protocol_metrics)
        };

        let options = NormalizeOptions::default();
        let by_date = group_by_date(
            flatten_records(token_records, options),
            flatten_records(token_supplies, options),
            flatten_records(protocol_metrics, options),
        );

        let mut metrics = Vec::with_capacity(by_date.len());
        for (date, mut container) in by_date.into_iter().rev() {
            if !container.is_complete() {
                warn!(
                    "Skipping {}: missing {}",
                    date,
                    container.missing_kinds().join(", ")
                );
                continue;
            }

            self.primary_first(&mut container.protocol_metrics);
            metrics.push(self.composer.compose(
                &container.token_records,
                &container.token_supplies,
                &container.protocol_metrics,
                compose_options,
            )?);
        }

        Ok(metrics)
    }

    /// The composer takes index and price from the first protocol metric; make
    /// that the primary source's.
    fn primary_first(&self, protocol_metrics: &mut [ProtocolMetric]) {
        let (primary, _) = self.completeness.sources();
        protocol_metrics.sort_by_key(|metric| metric.blockchain != Some(primary));
    }

    // ============================================
    // Cache access
    // ============================================

    fn cache_key<Q>(&self, operation: &str, query: &Q) -> Option<String>
    where
        Q: Serialize,
    {
        if self.cache.is_none() {
            return None;
        }
        match CacheLayer::key(operation, query) {
            Ok(key) => Some(key),
            Err(e) => {
                error!("Failed to build cache key for {}: {}", operation, e);
                None
            },
        }
    }

    async fn read_list<T>(&self, key: Option<&str>, ignore_cache: bool) -> Option<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let (cache, key) = (self.cache.as_ref()?, key?);
        if ignore_cache {
            debug!("Ignoring cache for {}", key);
            return None;
        }

        match cache.get_list(key).await {
            Ok(Some(items)) => {
                debug!("Cache hit for {} ({} items)", key, items.len());
                Some(items)
            },
            Ok(None) => {
                debug!("Cache miss for {}", key);
                None
            },
            Err(e) => {
                error!("Failed to read {} from cache: {}", key, e);
                None
            },
        }
    }

    async fn write_list<T>(&self, key: Option<&str>, items: &[T])
    where
        T: Serialize,
    {
        let (Some(cache), Some(key)) = (self.cache.as_ref(), key) else {
            return;
        };
        if let Err(e) = cache.set_list(key, items, cache.ttl()).await {
            error!("Failed to write {} to cache: {}", key, e);
        }
    }

    async fn read_value<T>(&self, key: Option<&str>, ignore_cache: bool) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let (cache, key) = (self.cache.as_ref()?, key?);
        if ignore_cache {
            debug!("Ignoring cache for {}", key);
            return None;
        }

        match cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to read {} from cache: {}", key, e);
                None
            },
        }
    }

    async fn write_value<T>(&self, key: Option<&str>, value: &T)
    where
        T: Serialize,
    {
        let (Some(cache), Some(key)) = (self.cache.as_ref(), key) else {
            return;
        };
        if let Err(e) = cache.set(key, value, cache.ttl()).await {
            error!("Failed to write {} to cache: {}", key, e);
        }
    }
}

/// Earlier of two cutoffs; no cutoff on either side means nothing is complete.
fn earliest_cutoff(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLayer, MemoryStore, StoreOp, TxOutcome, WatchGuard};
    use crate::error::CacheError;
    use crate::models::Blockchain;
    use crate::pipeline::supply::TokenIdentities;
    use crate::upstream::QueryResponse;
    use crate::utils::{sub_days, today_utc};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const OHM_ETHEREUM: &str = "0x64aa3364f17a4d01c6f1751fd97c2bd3d7e7f1d5";
    const GOHM_ARBITRUM: &str = "0x8d9ba570d6cb60c7e3e0f31343efe75ab8e65fb1";

    fn day(days_ago: u64) -> String {
        format_date(sub_days(today_utc(), days_ago))
    }

    fn token_record(date: &str, value: f64) -> Value {
        json!({
            "id": format!("dai-{}", date),
            "date": date,
            "block": "100",
            "source": "Treasury Wallet",
            "sourceAddress": "0x9a31",
            "token": "DAI",
            "tokenAddress": "0x6b175474e89094c44da98b954eedeac495271d0f",
            "category": "Stable",
            "isLiquid": true,
            "value": value.to_string(),
            "valueExcludingOhm": value.to_string(),
        })
    }

    fn token_supply(date: &str, address: &str, supply_type: &str, balance: f64) -> Value {
        json!({
            "id": format!("{}-{}-{}", supply_type, address, date),
            "date": date,
            "block": "100",
            "token": "OHM",
            "tokenAddress": address,
            "type": supply_type,
            "supplyBalance": balance.to_string(),
        })
    }

    fn protocol_metric(date: &str, index: f64, price: f64) -> Value {
        json!({
            "id": format!("metric-{}", date),
            "date": date,
            "block": "100",
            "currentIndex": index.to_string(),
            "ohmPrice": price.to_string(),
        })
    }

    /// Serves canned records per operation, honouring the window bounds.
    #[derive(Default)]
    struct FixtureUpstream {
        data: HashMap<&'static str, Value>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FixtureUpstream {
        fn with(mut self, operation: &'static str, data: Value) -> Self {
            self.data.insert(operation, data);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Upstream for FixtureUpstream {
        async fn query(&self, operation: &str, input: &Value) -> Result<QueryResponse, MetricsError> {
            self.calls
                .lock()
                .unwrap()
                .push((operation.to_string(), input.clone()));

            let Some(sources) = self.data.get(operation) else {
                return Ok(QueryResponse {
                    data: None,
                    error: Some(json!(format!("unknown operation {}", operation))),
                });
            };

            let start = input.get("startDate").and_then(Value::as_str);
            let end = input.get("endDate").and_then(Value::as_str);

            let mut out = serde_json::Map::new();
            for (source, records) in sources.as_object().unwrap() {
                let kept: Vec<Value> = records
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter(|record| {
                        let date = record["date"].as_str().unwrap();
                        start.map_or(true, |s| date >= s) && end.map_or(true, |e| date < e)
                    })
                    .cloned()
                    .collect();
                out.insert(source.clone(), Value::Array(kept));
            }

            Ok(QueryResponse {
                data: Some(Value::Object(out)),
                error: None,
            })
        }
    }

    /// Ethereum reports days 1-3, Arbitrum days 2-3, day 4 has token records only.
    fn fixture() -> FixtureUpstream {
        let (d1, d2, d3, d4) = (day(1), day(2), day(3), day(4));

        FixtureUpstream::default()
            .with(
                upstream::TOKEN_RECORDS,
                json!({
                    "Ethereum": [
                        token_record(&d1, 1000.0),
                        token_record(&d2, 1000.0),
                        token_record(&d3, 1000.0),
                        token_record(&d4, 1000.0),
                    ],
                    "Arbitrum": [token_record(&d2, 500.0), token_record(&d3, 500.0)],
                }),
            )
            .with(
                upstream::TOKEN_SUPPLIES,
                json!({
                    "Ethereum": [
                        token_supply(&d1, OHM_ETHEREUM, "Total Supply", 100.0),
                        token_supply(&d1, OHM_ETHEREUM, "Treasury", -10.0),
                        token_supply(&d2, OHM_ETHEREUM, "Total Supply", 100.0),
                        token_supply(&d2, OHM_ETHEREUM, "Treasury", -10.0),
                        token_supply(&d3, OHM_ETHEREUM, "Total Supply", 100.0),
                    ],
                    "Arbitrum": [
                        token_supply(&d2, GOHM_ARBITRUM, "Total Supply", 5.0),
                        token_supply(&d3, GOHM_ARBITRUM, "Total Supply", 5.0),
                    ],
                }),
            )
            .with(
                upstream::PROTOCOL_METRICS,
                json!({
                    "Ethereum": [
                        protocol_metric(&d1, 10.0, 20.0),
                        protocol_metric(&d2, 10.0, 20.0),
                        protocol_metric(&d3, 10.0, 20.0),
                    ],
                }),
            )
    }

    fn aggregator(upstream: Arc<FixtureUpstream>) -> Aggregator {
        let composer = MetricComposer::new(SupplyClassifier::new(TokenIdentities::default()));
        Aggregator::new(upstream, composer)
    }

    fn cached(upstream: Arc<FixtureUpstream>, store: Arc<dyn KeyValueStore>) -> Aggregator {
        aggregator(upstream).with_cache(CacheLayer::with_options(
            store,
            1000,
            Duration::from_secs(3600),
        ))
    }

    fn metrics_query() -> MetricsQuery {
        MetricsQuery {
            start_date: day(5),
            date_offset: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_paginated_metrics_one_per_complete_day() {
        let upstream = Arc::new(fixture());
        let metrics = aggregator(upstream.clone())
            .paginated_metrics(&metrics_query())
            .await
            .unwrap();

        let dates: Vec<String> = metrics.iter().map(|m| format_date(m.date)).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3)]);

        // Day 1: Ethereum only
        assert_eq!(metrics[0].treasury_market_value, 1000.0);
        assert_eq!(metrics[0].ohm_total_supply, 100.0);
        assert_eq!(metrics[0].ohm_circulating_supply, 90.0);
        assert_eq!(metrics[0].market_cap, 20.0 * 90.0);

        // Day 2: Arbitrum wrapped supply converted at index 10
        assert_eq!(metrics[1].treasury_market_value, 1500.0);
        assert_eq!(metrics[1].ohm_total_supply, 150.0);
        assert_eq!(
            metrics[1].ohm_total_supply_components.get(&Blockchain::Arbitrum),
            Some(&50.0)
        );
        assert!(metrics[1].records.is_none());

        // Three windows per record kind
        assert_eq!(upstream.call_count(), 9);
    }

    #[tokio::test]
    async fn test_windows_are_queried_newest_first() {
        let upstream = Arc::new(fixture());
        aggregator(upstream.clone())
            .paginated_metrics(&metrics_query())
            .await
            .unwrap();

        let calls = upstream.calls.lock().unwrap();
        let starts: Vec<&str> = calls
            .iter()
            .filter(|(operation, _)| operation == upstream::TOKEN_RECORDS)
            .map(|(_, input)| input["startDate"].as_str().unwrap())
            .collect();
        assert_eq!(starts, vec![day(1), day(3), day(5)]);
    }

    #[tokio::test]
    async fn test_cross_chain_complete_trims_to_common_day() {
        let upstream = Arc::new(fixture());
        let query = MetricsQuery {
            cross_chain_data_complete: true,
            ..metrics_query()
        };

        let metrics = aggregator(upstream).paginated_metrics(&query).await.unwrap();
        let dates: Vec<String> = metrics.iter().map(|m| format_date(m.date)).collect();
        assert_eq!(dates, vec![day(2), day(3)]);
    }

    #[tokio::test]
    async fn test_include_records_attaches_day_records() {
        let query = MetricsQuery {
            include_records: true,
            ..metrics_query()
        };
        let metrics = aggregator(Arc::new(fixture()))
            .paginated_metrics(&query)
            .await
            .unwrap();

        let records = metrics[1].records.as_ref().unwrap();
        assert_eq!(records.token_records.len(), 2);
        assert_eq!(records.token_supplies.len(), 3);
        assert_eq!(records.protocol_metrics.len(), 1);
        assert_eq!(records.token_records[0].blockchain, Some(Blockchain::Arbitrum));
    }

    #[tokio::test]
    async fn test_invalid_start_date_has_no_side_effects() {
        let upstream = Arc::new(fixture());
        let store = Arc::new(MemoryStore::new());
        let query = MetricsQuery {
            start_date: "2023-13-45".into(),
            ..Default::default()
        };

        let err = cached(upstream.clone(), store.clone())
            .paginated_metrics(&query)
            .await
            .unwrap_err();

        assert!(matches!(err, MetricsError::InvalidDate(_)));
        assert_eq!(upstream.call_count(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_supply_token_aborts() {
        let upstream = Arc::new(
            fixture().with(
                upstream::TOKEN_SUPPLIES,
                json!({ "Ethereum": [token_supply(&day(1), "0xdead", "Total Supply", 1.0)] }),
            ),
        );

        let err = aggregator(upstream)
            .paginated_metrics(&metrics_query())
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::UpstreamData(_)));
    }

    #[tokio::test]
    async fn test_upstream_error_aborts() {
        let upstream = Arc::new(FixtureUpstream::default());
        let err = aggregator(upstream)
            .paginated_metrics(&metrics_query())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown operation"));
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let upstream = Arc::new(fixture());
        let aggregator = cached(upstream.clone(), Arc::new(MemoryStore::new()));

        let first = aggregator.paginated_metrics(&metrics_query()).await.unwrap();
        let second = aggregator.paginated_metrics(&metrics_query()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(upstream.call_count(), 9);

        let refreshed = aggregator
            .paginated_metrics(&MetricsQuery {
                ignore_cache: true,
                ..metrics_query()
            })
            .await
            .unwrap();
        assert_eq!(refreshed, first);
        assert_eq!(upstream.call_count(), 18);
    }

    #[test]
    fn test_ignore_cache_is_not_part_of_the_key() {
        let a = CacheLayer::key(PAGINATED_METRICS, &metrics_query()).unwrap();
        let b = CacheLayer::key(
            PAGINATED_METRICS,
            &MetricsQuery {
                ignore_cache: true,
                ..metrics_query()
            },
        )
        .unwrap();
        assert_eq!(a, b);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Store("connection refused".into()))
        }
        async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Store("connection refused".into()))
        }
        async fn llen(&self, _key: &str) -> Result<usize, CacheError> {
            Err(CacheError::Store("connection refused".into()))
        }
        async fn lrange(&self, _key: &str, _start: usize, _stop: usize) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Store("connection refused".into()))
        }
        async fn watch(&self, _key: &str) -> Result<WatchGuard, CacheError> {
            Err(CacheError::Store("connection refused".into()))
        }
        async fn exec(&self, _guard: WatchGuard, _ops: Vec<StoreOp>) -> Result<TxOutcome, CacheError> {
            Err(CacheError::Store("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_cache_failures_fall_back_to_upstream() {
        let upstream = Arc::new(fixture());
        let aggregator = cached(upstream.clone(), Arc::new(FailingStore));

        let metrics = aggregator.paginated_metrics(&metrics_query()).await.unwrap();
        assert_eq!(metrics.len(), 3);

        let metric = aggregator
            .paginated_token_records(&RecordsQuery {
                start_date: day(5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(metric.len(), 6);
    }

    #[tokio::test]
    async fn test_paginated_token_records_sorted_newest_first() {
        let upstream = Arc::new(fixture());
        let query = RecordsQuery {
            start_date: day(5),
            date_offset: Some(3),
            ..Default::default()
        };

        let records = aggregator(upstream).paginated_token_records(&query).await.unwrap();
        let dates: Vec<String> = records.iter().map(|r| format_date(r.date)).collect();
        assert_eq!(dates, vec![day(1), day(2), day(2), day(3), day(3), day(4)]);
        assert!(records.iter().all(|r| r.blockchain.is_some()));
    }

    #[tokio::test]
    async fn test_paginated_token_supplies_cross_chain_complete() {
        let upstream = Arc::new(fixture());
        let query = RecordsQuery {
            start_date: day(5),
            cross_chain_data_complete: true,
            ..Default::default()
        };

        let supplies = aggregator(upstream).paginated_token_supplies(&query).await.unwrap();
        assert!(supplies.iter().all(|s| s.date <= sub_days(today_utc(), 2)));
        assert_eq!(supplies.len(), 5);
    }

    #[tokio::test]
    async fn test_paginated_protocol_metrics() {
        let query = RecordsQuery {
            start_date: day(2),
            ..Default::default()
        };
        let metrics = aggregator(Arc::new(fixture()))
            .paginated_protocol_metrics(&query)
            .await
            .unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].blockchain, Some(Blockchain::Ethereum));
    }

    fn snapshot_fixture(days_ago: u64) -> FixtureUpstream {
        let d = day(days_ago);
        FixtureUpstream::default()
            .with(
                upstream::LATEST_TOKEN_RECORDS,
                json!({ "Ethereum": [token_record(&d, 1000.0)] }),
            )
            .with(
                upstream::LATEST_TOKEN_SUPPLIES,
                json!({ "Ethereum": [token_supply(&d, OHM_ETHEREUM, "Total Supply", 100.0)] }),
            )
            .with(
                upstream::LATEST_PROTOCOL_METRICS,
                json!({ "Ethereum": [protocol_metric(&d, 10.0, 20.0)] }),
            )
    }

    #[tokio::test]
    async fn test_latest_metric_is_cached() {
        let upstream = Arc::new(snapshot_fixture(1));
        let aggregator = cached(upstream.clone(), Arc::new(MemoryStore::new()));

        let metric = aggregator.latest_metric(&SnapshotQuery::default()).await.unwrap();
        assert_eq!(format_date(metric.date), day(1));
        assert_eq!(metric.ohm_total_supply, 100.0);
        assert_eq!(upstream.call_count(), 3);

        let again = aggregator.latest_metric(&SnapshotQuery::default()).await.unwrap();
        assert_eq!(again, metric);
        assert_eq!(upstream.call_count(), 3);
    }

    #[tokio::test]
    async fn test_earliest_metric_uses_earliest_operations() {
        let upstream = Arc::new(snapshot_fixture(1));
        let err = aggregator(upstream.clone())
            .earliest_metric(&SnapshotQuery::default())
            .await
            .unwrap_err();

        // Only the latest operations are served by this fixture
        assert!(matches!(err, MetricsError::UpstreamData(_)));
        assert_eq!(upstream.calls.lock().unwrap()[0].0, upstream::EARLIEST_TOKEN_RECORDS);
    }

    #[test]
    fn test_earliest_cutoff() {
        let a = NaiveDate::from_ymd_opt(2023, 5, 1);
        let b = NaiveDate::from_ymd_opt(2023, 5, 3);
        assert_eq!(earliest_cutoff(a, b), a);
        assert_eq!(earliest_cutoff(a, None), None);
        assert_eq!(earliest_cutoff(None, None), None);
    }
}
