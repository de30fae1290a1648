use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use treasury_metrics::cache::CacheLayer;
use treasury_metrics::pipeline::{MetricComposer, SupplyClassifier, TokenIdentities};
use treasury_metrics::upstream::{self, QueryResponse};
use treasury_metrics::utils::{format_date, sub_days, today_utc};
use treasury_metrics::{
    Aggregator, Blockchain, MemoryStore, MetricsError, MetricsQuery, RecordsQuery, Upstream,
};

const OHM_ETHEREUM: &str = "0x64aa3364f17a4d01c6f1751fd97c2bd3d7e7f1d5";
const OHM_ARBITRUM: &str = "0xf0cb2dc0db5e6c66b9a70ac27b06b878da017028";
const GOHM_ETHEREUM: &str = "0x0ab87046fbb341d058f17cbc4c1133f25a20a52f";

fn day(days_ago: u64) -> String {
    format_date(sub_days(today_utc(), days_ago))
}

/// A subgraph gateway holding a fixed history per source.
///
/// Ethereum reports the last 25 days, Arbitrum lags by two days. Two
/// snapshots are indexed on Ethereum each day; only the later block counts.
struct Gateway {
    calls: AtomicUsize,
}

impl Gateway {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn token_records(source: &str, days: std::ops::RangeInclusive<u64>) -> Vec<Value> {
        days.flat_map(|n| {
            let date = day(n);
            vec![
                json!({
                    "id": format!("{}-usdc-{}", source, date),
                    "date": date,
                    "block": 1000 - n,
                    "timestamp": 1_700_000_000u64 - n * 86_400,
                    "source": "Treasury MS",
                    "sourceAddress": "0x245cc372c84b3645bf0ffe6538620b04a217988b",
                    "token": "USDC",
                    "tokenAddress": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                    "category": "Stable",
                    "isLiquid": true,
                    "isBluechip": false,
                    "balance": "1000000",
                    "rate": "1",
                    "multiplier": "1",
                    "value": "1000000.5",
                    "valueExcludingOhm": "1000000.5",
                }),
                json!({
                    "id": format!("{}-pol-{}", source, date),
                    "date": date,
                    "block": 1000 - n,
                    "source": "Treasury MS",
                    "sourceAddress": "0x245cc372c84b3645bf0ffe6538620b04a217988b",
                    "token": "OHM-DAI LP",
                    "tokenAddress": "0x055475920a8c93cffb64d039a8205f7acc7722d3",
                    "category": "Protocol-Owned Liquidity",
                    "isLiquid": false,
                    "value": 250000.25,
                    "valueExcludingOhm": 120000.1,
                }),
            ]
        })
        .collect()
    }

    fn token_supplies(source: &str, address: &str, days: std::ops::RangeInclusive<u64>) -> Vec<Value> {
        days.flat_map(|n| {
            let date = day(n);
            vec![
                json!({
                    "id": format!("{}-total-{}", source, date),
                    "date": date,
                    "block": 1000 - n,
                    "token": "OHM",
                    "tokenAddress": address,
                    "type": "Total Supply",
                    "supplyBalance": "15000000.123",
                }),
                json!({
                    "id": format!("{}-treasury-{}", source, date),
                    "date": date,
                    "block": 1000 - n,
                    "token": "OHM",
                    "tokenAddress": address,
                    "type": "Treasury",
                    "supplyBalance": "-250000.5",
                }),
                json!({
                    "id": format!("{}-unknown-{}", source, date),
                    "date": date,
                    "block": 1000 - n,
                    "token": "OHM",
                    "tokenAddress": "0x0000000000000000000000000000000000000001",
                    "type": "Unclassified",
                    "supplyBalance": "99",
                }),
            ]
        })
        .collect()
    }

    fn protocol_metrics(days: std::ops::RangeInclusive<u64>) -> Vec<Value> {
        days.flat_map(|n| {
            let date = day(n);
            vec![
                // Earlier snapshot of the same day, superseded below
                json!({
                    "id": format!("early-{}", date),
                    "date": date,
                    "block": 900 - n,
                    "currentIndex": "1",
                    "ohmPrice": "1",
                }),
                json!({
                    "id": format!("metric-{}", date),
                    "date": date,
                    "block": 1000 - n,
                    "currentIndex": "269.24",
                    "currentAPY": "7.1",
                    "ohmPrice": "11.37",
                    "sOhmCirculatingSupply": "3000000",
                }),
            ]
        })
        .collect()
    }

    fn history(operation: &str) -> Option<Value> {
        let data = match operation {
            upstream::TOKEN_RECORDS => json!({
                "Ethereum": Self::token_records("eth", 0..=24),
                "Arbitrum": Self::token_records("arb", 2..=24),
            }),
            upstream::TOKEN_SUPPLIES => {
                let mut ethereum = Self::token_supplies("eth", OHM_ETHEREUM, 0..=24);
                ethereum.push(json!({
                    "id": "eth-gohm-lending",
                    "date": day(5),
                    "block": 995,
                    "token": "gOHM",
                    "tokenAddress": GOHM_ETHEREUM,
                    "type": "Lending",
                    "supplyBalance": "-100",
                }));
                json!({
                    "Ethereum": ethereum,
                    "Arbitrum": Self::token_supplies("arb", OHM_ARBITRUM, 2..=24),
                })
            },
            upstream::PROTOCOL_METRICS => json!({
                "Ethereum": Self::protocol_metrics(0..=24),
            }),
            _ => return None,
        };
        Some(data)
    }
}

#[async_trait]
impl Upstream for Gateway {
    async fn query(&self, operation: &str, input: &Value) -> Result<QueryResponse, MetricsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let Some(history) = Self::history(operation) else {
            return Ok(QueryResponse {
                data: None,
                error: Some(json!("unsupported operation")),
            });
        };

        let start = input["startDate"].as_str().unwrap_or("0000-00-00");
        let end = input["endDate"].as_str().unwrap_or("9999-99-99");

        let mut data = serde_json::Map::new();
        for (source, records) in history.as_object().unwrap() {
            let in_window: Vec<Value> = records
                .as_array()
                .unwrap()
                .iter()
                .filter(|record| {
                    let date = record["date"].as_str().unwrap();
                    date >= start && date < end
                })
                .cloned()
                .collect();
            data.insert(source.clone(), Value::Array(in_window));
        }

        Ok(QueryResponse {
            data: Some(Value::Object(data)),
            error: None,
        })
    }
}

fn aggregator(gateway: Arc<Gateway>, store: Arc<MemoryStore>) -> Aggregator {
    let composer = MetricComposer::new(SupplyClassifier::new(TokenIdentities::default()));
    Aggregator::new(gateway, composer).with_cache(CacheLayer::with_options(
        store,
        7,
        Duration::from_secs(3600),
    ))
}

#[tokio::test]
async fn cached_aggregation_is_byte_identical() {
    let gateway = Arc::new(Gateway::new());
    let aggregator = aggregator(gateway.clone(), Arc::new(MemoryStore::new()));
    let query = MetricsQuery {
        start_date: day(20),
        date_offset: Some(3),
        include_records: true,
        ..Default::default()
    };

    let first = aggregator.paginated_metrics(&query).await.unwrap();
    let calls = gateway.calls();
    let second = aggregator.paginated_metrics(&query).await.unwrap();

    assert_eq!(gateway.calls(), calls);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.len(), 21);
}

#[tokio::test]
async fn metrics_are_sorted_newest_first() {
    let aggregator = aggregator(Arc::new(Gateway::new()), Arc::new(MemoryStore::new()));
    let metrics = aggregator
        .paginated_metrics(&MetricsQuery {
            start_date: day(10),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(metrics.windows(2).all(|pair| pair[0].date > pair[1].date));
    assert_eq!(format_date(metrics[0].date), day(0));
    assert_eq!(format_date(metrics[metrics.len() - 1].date), day(10));
}

#[tokio::test]
async fn latest_block_and_classification_rules_apply() {
    let aggregator = aggregator(Arc::new(Gateway::new()), Arc::new(MemoryStore::new()));
    let metrics = aggregator
        .paginated_metrics(&MetricsQuery {
            start_date: day(6),
            ..Default::default()
        })
        .await
        .unwrap();

    let lagging = metrics.iter().find(|m| format_date(m.date) == day(3)).unwrap();
    assert_eq!(lagging.ohm_index, 269.24);
    assert_eq!(lagging.ohm_price, 11.37);
    // Unknown supply types are ignored
    assert!((lagging.ohm_total_supply - 2.0 * 15000000.123).abs() < 1e-6);
    assert!((lagging.ohm_circulating_supply - 2.0 * (15000000.123 - 250000.5)).abs() < 1e-6);
    assert_eq!(lagging.ohm_floating_supply, lagging.ohm_circulating_supply);
    assert_eq!(
        lagging.treasury_market_value_components.get(&Blockchain::Arbitrum),
        Some(&(1000000.5 + 250000.25))
    );
    // Illiquid POL counts towards market value only
    assert!((lagging.treasury_liquid_backing - 2.0 * 1000000.5).abs() < 1e-6);

    // Wrapped lending position converted at the index
    let with_lending = metrics.iter().find(|m| format_date(m.date) == day(5)).unwrap();
    assert!(
        (with_lending.ohm_backed_supply - (with_lending.ohm_floating_supply - 100.0 * 269.24)).abs()
            < 1e-6
    );
}

#[tokio::test]
async fn cross_chain_complete_drops_days_ahead_of_the_lagging_chain() {
    let aggregator = aggregator(Arc::new(Gateway::new()), Arc::new(MemoryStore::new()));

    let partial = aggregator
        .paginated_metrics(&MetricsQuery {
            start_date: day(10),
            ..Default::default()
        })
        .await
        .unwrap();
    let complete = aggregator
        .paginated_metrics(&MetricsQuery {
            start_date: day(10),
            cross_chain_data_complete: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(partial.len(), 11);
    assert_eq!(complete.len(), 9);
    assert_eq!(format_date(complete[0].date), day(2));
    assert!(complete
        .iter()
        .all(|m| m.ohm_total_supply_components.contains_key(&Blockchain::Arbitrum)));

    let records = aggregator
        .paginated_token_records(&RecordsQuery {
            start_date: day(10),
            cross_chain_data_complete: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(format_date(records[0].date), day(2));
}

#[tokio::test]
async fn invalid_start_date_is_rejected() {
    let gateway = Arc::new(Gateway::new());
    let store = Arc::new(MemoryStore::new());
    let err = aggregator(gateway.clone(), store.clone())
        .paginated_metrics(&MetricsQuery {
            start_date: "yesterday".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind().status_code(), 400);
    assert_eq!(gateway.calls(), 0);
    assert!(store.is_empty().await);
}
