use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Blockchain, ProtocolMetric, TokenRecord, TokenSupply};

/// Per-chain breakdown of an aggregate.
pub type ChainValues = BTreeMap<Blockchain, f64>;

/// Canonical per-day treasury metric, reconciled across all sources.
///
/// Built once by the composer and never mutated afterwards. Ratios whose
/// denominator aggregate is zero are `None` (serialized as `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub date: NaiveDate,
    pub blocks: BTreeMap<Blockchain, u64>,
    pub timestamps: BTreeMap<Blockchain, u64>,

    // Protocol state
    pub ohm_index: f64,
    pub ohm_apy: f64,
    pub ohm_price: f64,
    pub g_ohm_price: f64,

    // Supply
    pub ohm_total_supply: f64,
    pub ohm_total_supply_components: ChainValues,
    pub ohm_circulating_supply: f64,
    pub ohm_circulating_supply_components: ChainValues,
    pub ohm_floating_supply: f64,
    pub ohm_floating_supply_components: ChainValues,
    pub ohm_backed_supply: f64,
    pub ohm_backed_supply_components: ChainValues,
    pub g_ohm_backed_supply: f64,
    pub s_ohm_circulating_supply: f64,
    pub s_ohm_total_value_locked: f64,

    // Market
    pub market_cap: f64,

    // Treasury
    pub treasury_market_value: f64,
    pub treasury_market_value_components: ChainValues,
    pub treasury_liquid_backing: f64,
    pub treasury_liquid_backing_components: ChainValues,
    pub treasury_liquid_backing_per_ohm_floating: Option<f64>,
    pub treasury_liquid_backing_per_ohm_backed: Option<f64>,
    pub treasury_liquid_backing_per_g_ohm_backed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<MetricRecords>,
}

/// Source records a metric was computed from, attached on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecords {
    pub token_records: Vec<TokenRecord>,
    pub token_supplies: Vec<TokenSupply>,
    pub protocol_metrics: Vec<ProtocolMetric>,
}
