use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Blockchain, SourceRecord};
use crate::utils::{f64_from_any, u64_from_any};

/// Protocol-level state for one blockchain on one day.
///
/// Published by the Ethereum subgraph only; `current_index` is the rebase
/// index used to convert the wrapped token into native units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetric {
    pub id: String,
    pub date: NaiveDate,
    #[serde(deserialize_with = "u64_from_any")]
    pub block: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub timestamp: u64,
    #[serde(deserialize_with = "f64_from_any")]
    pub current_index: f64,
    #[serde(rename = "currentAPY", default, deserialize_with = "f64_from_any")]
    pub current_apy: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub ohm_price: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub g_ohm_price: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub g_ohm_total_supply: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub ohm_total_supply: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub s_ohm_circulating_supply: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub total_value_locked: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<Blockchain>,
}

impl SourceRecord for ProtocolMetric {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn block(&self) -> u64 {
        self.block
    }

    fn blockchain(&self) -> Option<Blockchain> {
        self.blockchain
    }

    fn set_blockchain(&mut self, blockchain: Blockchain) {
        self.blockchain = Some(blockchain);
    }
}
